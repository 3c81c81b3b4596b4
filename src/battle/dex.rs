//! Built-in species and move tables used by the scripted battle sessions

use serde::{Deserialize, Serialize};

/// A move a creature can use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub name: String,
    pub power: u16,
    /// Hit chance in percent
    pub accuracy: u8,
}

/// A creature entry on a team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatureSpec {
    pub species: String,
    /// Generation the species was introduced in
    pub generation: u8,
    pub hp: u16,
    pub attack: u16,
    pub defense: u16,
    pub speed: u16,
    pub moves: Vec<Move>,
}

const MOVES: &[(&str, u16, u8)] = &[
    ("Body Slam", 85, 100),
    ("Hyper Beam", 150, 90),
    ("Earthquake", 100, 100),
    ("Thunderbolt", 95, 100),
    ("Ice Beam", 95, 100),
    ("Psychic", 90, 100),
    ("Surf", 95, 100),
    ("Blizzard", 120, 90),
    ("Rock Slide", 75, 90),
    ("Double-Edge", 120, 100),
    ("Thunder", 120, 70),
    ("Drill Peck", 80, 100),
    ("Crunch", 80, 100),
    ("Steel Wing", 70, 90),
    ("Meteor Mash", 100, 85),
    ("Dragon Claw", 80, 100),
    ("Aura Sphere", 90, 100),
    ("Lava Plume", 80, 100),
    ("Return", 102, 100),
    ("Seismic Toss", 50, 100),
];

type DexRow = (&'static str, u8, [u16; 4], [&'static str; 4]);

const SPECIES: &[DexRow] = &[
    ("Tauros", 1, [75, 100, 95, 110], ["Body Slam", "Hyper Beam", "Earthquake", "Blizzard"]),
    ("Chansey", 1, [250, 5, 5, 50], ["Seismic Toss", "Ice Beam", "Thunderbolt", "Body Slam"]),
    ("Snorlax", 1, [160, 110, 65, 30], ["Body Slam", "Earthquake", "Hyper Beam", "Double-Edge"]),
    ("Starmie", 1, [60, 75, 85, 115], ["Surf", "Psychic", "Thunderbolt", "Blizzard"]),
    ("Alakazam", 1, [55, 50, 45, 120], ["Psychic", "Seismic Toss", "Thunder", "Body Slam"]),
    ("Exeggutor", 1, [95, 95, 85, 55], ["Psychic", "Double-Edge", "Hyper Beam", "Body Slam"]),
    ("Zapdos", 1, [90, 90, 85, 100], ["Thunderbolt", "Drill Peck", "Thunder", "Double-Edge"]),
    ("Rhydon", 1, [105, 130, 120, 40], ["Earthquake", "Rock Slide", "Body Slam", "Double-Edge"]),
    ("Jolteon", 1, [65, 65, 60, 130], ["Thunderbolt", "Double-Edge", "Thunder", "Body Slam"]),
    ("Lapras", 1, [130, 85, 80, 60], ["Blizzard", "Surf", "Thunderbolt", "Body Slam"]),
    ("Slowbro", 1, [95, 75, 110, 30], ["Surf", "Psychic", "Ice Beam", "Body Slam"]),
    ("Gengar", 1, [60, 65, 60, 110], ["Thunderbolt", "Psychic", "Seismic Toss", "Hyper Beam"]),
    ("Skarmory", 2, [65, 80, 140, 70], ["Drill Peck", "Steel Wing", "Return", "Double-Edge"]),
    ("Tyranitar", 2, [100, 134, 110, 61], ["Rock Slide", "Crunch", "Earthquake", "Return"]),
    ("Blissey", 2, [255, 10, 10, 55], ["Seismic Toss", "Ice Beam", "Thunderbolt", "Return"]),
    ("Raikou", 2, [90, 85, 75, 115], ["Thunderbolt", "Crunch", "Thunder", "Return"]),
    ("Suicune", 2, [100, 75, 115, 85], ["Surf", "Ice Beam", "Return", "Blizzard"]),
    ("Metagross", 3, [80, 135, 130, 70], ["Meteor Mash", "Earthquake", "Rock Slide", "Psychic"]),
    ("Salamence", 3, [95, 135, 80, 100], ["Dragon Claw", "Earthquake", "Double-Edge", "Rock Slide"]),
    ("Swampert", 3, [100, 110, 90, 60], ["Surf", "Earthquake", "Ice Beam", "Rock Slide"]),
    ("Celebi", 2, [100, 100, 100, 100], ["Psychic", "Return", "Earthquake", "Thunderbolt"]),
    ("Garchomp", 4, [108, 130, 95, 102], ["Earthquake", "Dragon Claw", "Crunch", "Rock Slide"]),
    ("Lucario", 4, [70, 110, 70, 90], ["Aura Sphere", "Crunch", "Earthquake", "Return"]),
    ("Heatran", 4, [91, 90, 106, 77], ["Lava Plume", "Earthquake", "Crunch", "Return"]),
];

fn lookup_move(name: &str) -> Move {
    // Unknown names degrade to a weak typeless hit
    let (name, power, accuracy) = MOVES
        .iter()
        .find(|(candidate, _, _)| *candidate == name)
        .copied()
        .unwrap_or(("Struggle", 50, 100));
    Move {
        name: name.to_string(),
        power,
        accuracy,
    }
}

/// All species available in the given generation, in dex order.
pub fn species_for_generation(generation: u8) -> Vec<CreatureSpec> {
    SPECIES
        .iter()
        .filter(|(_, introduced, _, _)| *introduced <= generation)
        .map(|(species, introduced, [hp, attack, defense, speed], moves)| CreatureSpec {
            species: species.to_string(),
            generation: *introduced,
            hp: *hp,
            attack: *attack,
            defense: *defense,
            speed: *speed,
            moves: moves.iter().map(|name| lookup_move(name)).collect(),
        })
        .collect()
}
