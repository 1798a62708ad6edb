use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Horizontal {
    W,
    E,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Vertical {
    N,
    S,
}

impl fmt::Display for Horizontal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Horizontal::W => f.write_str("W"),
            Horizontal::E => f.write_str("E"),
        }
    }
}

impl fmt::Display for Vertical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vertical::N => f.write_str("N"),
            Vertical::S => f.write_str("S"),
        }
    }
}

/// The four world quadrants in fetch order.
pub const ALL_DIRECTIONS: [(Horizontal, Vertical); 4] = [
    (Horizontal::W, Vertical::N),
    (Horizontal::W, Vertical::S),
    (Horizontal::E, Vertical::N),
    (Horizontal::E, Vertical::S),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomCoordinate {
    pub horizontal: Horizontal,
    pub vertical: Vertical,
    pub x: u32,
    pub y: u32,
}

impl RoomCoordinate {
    pub fn new(horizontal: Horizontal, vertical: Vertical, x: u32, y: u32) -> Self {
        Self { horizontal, vertical, x, y }
    }

    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RoomCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}{}", self.horizontal, self.x, self.vertical, self.y)
    }
}

pub fn deposit_type(horizontal: Horizontal, vertical: Vertical) -> &'static str {
    match (horizontal, vertical) {
        (Horizontal::W, Vertical::N) => "silicon",
        (Horizontal::W, Vertical::S) => "biomass",
        (Horizontal::E, Vertical::N) => "metal",
        (Horizontal::E, Vertical::S) => "mist",
    }
}

pub fn quadrant_room_status(horizontal: Horizontal, _vertical: Vertical) -> &'static str {
    match horizontal {
        Horizontal::W => "normal",
        Horizontal::E => "not available",
    }
}

fn room_name_pattern() -> &'static Regex {
    static ROOM_NAME: OnceLock<Regex> = OnceLock::new();
    ROOM_NAME.get_or_init(|| {
        Regex::new(r"^([WE])(\d+)([NS])(\d+)$").expect("room name pattern is a valid regex")
    })
}

/// True when either coordinate of the room lies on a multiple of ten.
pub fn is_highway(room_name: &str) -> bool {
    let Some(parsed) = room_name_pattern().captures(room_name) else {
        return false;
    };
    // divisible by ten iff the last digit is zero
    parsed[2].ends_with('0') || parsed[4].ends_with('0')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusPolicy {
    ByQuadrant,
    Fixed(String),
}

impl StatusPolicy {
    fn status_for(&self, horizontal: Horizontal, vertical: Vertical) -> String {
        match self {
            StatusPolicy::ByQuadrant => quadrant_room_status(horizontal, vertical).to_string(),
            StatusPolicy::Fixed(status) => status.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomTask {
    /// 1-based position in dispatch order.
    pub index: usize,
    pub coordinate: RoomCoordinate,
    pub deposit_type: &'static str,
    pub status: String,
}

impl RoomTask {
    pub fn room_name(&self) -> String {
        self.coordinate.name()
    }
}

/// Enumerates every room: direction pairs outermost, then `y`, then `x`.
pub fn build_worklist(
    directions: &[(Horizontal, Vertical)],
    xs: Range<u32>,
    ys: Range<u32>,
    status_policy: &StatusPolicy,
) -> Vec<RoomTask> {
    let capacity = directions.len() * xs.len() * ys.len();
    let mut tasks = Vec::with_capacity(capacity);
    for &(horizontal, vertical) in directions {
        let deposit = deposit_type(horizontal, vertical);
        let status = status_policy.status_for(horizontal, vertical);
        for y in ys.clone() {
            for x in xs.clone() {
                tasks.push(RoomTask {
                    index: tasks.len() + 1,
                    coordinate: RoomCoordinate::new(horizontal, vertical, x, y),
                    deposit_type: deposit,
                    status: status.clone(),
                });
            }
        }
    }
    tasks
}
