//! Static grid-world model
//!
//! Holds the level map, the start and finish cells, and the per-cell table of
//! expected directions. Direction queries are stricter than plain maze
//! legality: a step is legal only along the single bearing the level expects
//! for the current cell, even when other neighbours are open.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use super::error::{GridError, GridResult};

/// Grid coordinate (`x` = column, `y` = row, `y` grows southward)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    /// Column
    pub x: i32,
    /// Row
    pub y: i32,
}

impl Coord {
    /// Create a coordinate
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Neighbouring coordinate one step toward `direction`
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Eight-way compass bearing, numbered in eighth-turns clockwise from north
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Up
    North,
    /// Up-right
    NorthEast,
    /// Right
    East,
    /// Down-right
    SouthEast,
    /// Down
    South,
    /// Down-left
    SouthWest,
    /// Left
    West,
    /// Up-left
    NorthWest,
}

impl Direction {
    /// All bearings in clockwise order starting at north
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// Eighth-turns clockwise from north
    pub fn eighths(self) -> i32 {
        self as i32
    }

    /// Bearing for an eighth-turn count (any integer, wrapped)
    pub fn from_eighths(eighths: i32) -> Self {
        Self::ALL[eighths.rem_euclid(8) as usize]
    }

    /// Rotate clockwise by `eighths` (negative rotates anticlockwise)
    pub fn rotated(self, eighths: i32) -> Self {
        Self::from_eighths(self.eighths() + eighths)
    }

    /// Absolute bearing of a relative offset from this facing
    pub fn relative(self, relative: Relative) -> Self {
        self.rotated(2 * relative.offset())
    }

    /// Shortest signed rotation to `target` in eighth-turns, in `-3..=4`.
    /// Positive is clockwise; a half turn counts as clockwise.
    pub fn turn_to(self, target: Direction) -> i32 {
        let diff = (target.eighths() - self.eighths()).rem_euclid(8);
        if diff > 4 { diff - 8 } else { diff }
    }

    /// Unit step `(dx, dy)`
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::NorthEast => (1, -1),
            Direction::East => (1, 0),
            Direction::SouthEast => (1, 1),
            Direction::South => (0, 1),
            Direction::SouthWest => (-1, 1),
            Direction::West => (-1, 0),
            Direction::NorthWest => (-1, -1),
        }
    }

    /// Short compass form (`N`, `NE`, ...)
    pub fn abbreviation(self) -> &'static str {
        match self {
            Direction::North => "N",
            Direction::NorthEast => "NE",
            Direction::East => "E",
            Direction::SouthEast => "SE",
            Direction::South => "S",
            Direction::SouthWest => "SW",
            Direction::West => "W",
            Direction::NorthWest => "NW",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "n" | "north" => Ok(Direction::North),
            "ne" | "north-east" | "northeast" => Ok(Direction::NorthEast),
            "e" | "east" => Ok(Direction::East),
            "se" | "south-east" | "southeast" => Ok(Direction::SouthEast),
            "s" | "south" => Ok(Direction::South),
            "sw" | "south-west" | "southwest" => Ok(Direction::SouthWest),
            "w" | "west" => Ok(Direction::West),
            "nw" | "north-west" | "northwest" => Ok(Direction::NorthWest),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// Direction relative to the agent's facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Relative {
    /// Straight ahead (offset 0)
    Forward,
    /// Quarter turn clockwise (offset 1)
    Right,
    /// Behind (offset 2)
    Back,
    /// Quarter turn anticlockwise (offset 3)
    Left,
}

impl Relative {
    /// Offset in quarter turns
    pub fn offset(self) -> i32 {
        match self {
            Relative::Forward => 0,
            Relative::Right => 1,
            Relative::Back => 2,
            Relative::Left => 3,
        }
    }
}

/// Kind of a map cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CellKind {
    /// Impassable
    Wall,
    /// Passable
    Open,
    /// Passable, agent starts here
    Start,
    /// Passable, goal
    Finish,
}

impl CellKind {
    /// Parse a map symbol
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '#' => Some(CellKind::Wall),
            '.' => Some(CellKind::Open),
            'S' => Some(CellKind::Start),
            'F' => Some(CellKind::Finish),
            _ => None,
        }
    }

    /// Map symbol for this kind
    pub fn symbol(self) -> char {
        match self {
            CellKind::Wall => '#',
            CellKind::Open => '.',
            CellKind::Start => 'S',
            CellKind::Finish => 'F',
        }
    }

    /// Whether the agent may stand on this cell
    pub fn is_passable(self) -> bool {
        self != CellKind::Wall
    }
}

/// Result of a cell lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    /// Cell inside the map
    InBounds(CellKind),
    /// Coordinate outside the map
    OutOfBounds,
}

/// Answer to a direction query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// Legal: target passable and bearing is the expected one
    Open,
    /// Target is a wall
    Wall,
    /// Target is outside the map
    OutOfBounds,
    /// Target is passable but the bearing is not the expected one
    Unexpected {
        /// Bearing the level expects at the queried cell
        expected: Option<Direction>,
    },
}

impl Query {
    /// Whether the query is legal
    pub fn is_open(self) -> bool {
        self == Query::Open
    }
}

/// Immutable level map with start/finish cells and expected directions
#[derive(Debug, Clone, PartialEq)]
pub struct GridWorld {
    width: usize,
    height: usize,
    cells: Vec<CellKind>,
    expected: Vec<Option<Direction>>,
    start: Coord,
    finish: Coord,
}

impl GridWorld {
    /// Build a grid from a cell matrix and an expected-direction matrix of the
    /// same shape. Validates every structural invariant.
    pub fn new(map: Vec<Vec<CellKind>>, expected: Vec<Vec<Option<Direction>>>) -> GridResult<Self> {
        let height = map.len();
        let width = map.first().map(Vec::len).unwrap_or(0);
        if height == 0 || width == 0 {
            return Err(GridError::Empty);
        }

        for (row, cells) in map.iter().enumerate() {
            if cells.len() != width {
                return Err(GridError::Ragged {
                    row,
                    expected: width,
                    found: cells.len(),
                });
            }
        }

        if expected.len() != height || expected.iter().any(|row| row.len() != width) {
            let cols = expected
                .iter()
                .map(Vec::len)
                .find(|len| *len != width)
                .unwrap_or(width);
            return Err(GridError::TableShape {
                rows: expected.len(),
                cols,
                map_rows: height,
                map_cols: width,
            });
        }

        let mut start = None;
        let mut finish = None;
        for (y, row) in map.iter().enumerate() {
            for (x, kind) in row.iter().enumerate() {
                let at = Coord::new(x as i32, y as i32);
                match kind {
                    CellKind::Start if start.is_some() => return Err(GridError::DuplicateStart(at)),
                    CellKind::Start => start = Some(at),
                    CellKind::Finish if finish.is_some() => {
                        return Err(GridError::DuplicateFinish(at));
                    }
                    CellKind::Finish => finish = Some(at),
                    CellKind::Wall if expected[y][x].is_some() => {
                        return Err(GridError::DirectionOnWall(at));
                    }
                    _ => {}
                }
            }
        }

        let world = Self {
            width,
            height,
            cells: map.into_iter().flatten().collect(),
            expected: expected.into_iter().flatten().collect(),
            start: start.ok_or(GridError::MissingStart)?,
            finish: finish.ok_or(GridError::MissingFinish)?,
        };
        world.validate_chain()?;

        let stray = world.off_path_cells();
        if !stray.is_empty() {
            tracing::debug!(count = stray.len(), "open cells off the expected path");
        }

        Ok(world)
    }

    /// Build a grid from text rows.
    ///
    /// Map symbols: `#` wall, `.` open, `S` start, `F` finish. Expected rows
    /// hold one whitespace-separated token per cell (`N`, `NE`, ... or `-`).
    pub fn from_rows<R, E>(rows: &[R], expected: &[E]) -> GridResult<Self>
    where
        R: AsRef<str>,
        E: AsRef<str>,
    {
        let mut map = Vec::with_capacity(rows.len());
        for (y, row) in rows.iter().enumerate() {
            let mut cells = Vec::new();
            for (x, symbol) in row.as_ref().chars().enumerate() {
                let kind = CellKind::from_symbol(symbol).ok_or(GridError::UnknownCell {
                    symbol,
                    at: Coord::new(x as i32, y as i32),
                })?;
                cells.push(kind);
            }
            map.push(cells);
        }

        let mut table = Vec::with_capacity(expected.len());
        for (y, row) in expected.iter().enumerate() {
            let mut bearings = Vec::new();
            for (x, token) in row.as_ref().split_whitespace().enumerate() {
                if token == "-" {
                    bearings.push(None);
                    continue;
                }
                let direction = token.parse().map_err(|_| GridError::UnknownDirection {
                    token: token.to_string(),
                    at: Coord::new(x as i32, y as i32),
                })?;
                bearings.push(Some(direction));
            }
            table.push(bearings);
        }

        Self::new(map, table)
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows
    pub fn height(&self) -> usize {
        self.height
    }

    /// START cell
    pub fn start(&self) -> Coord {
        self.start
    }

    /// FINISH cell
    pub fn finish(&self) -> Coord {
        self.finish
    }

    /// Kind of the cell at `(x, y)`
    pub fn cell_at(&self, x: i32, y: i32) -> Cell {
        match self.index(x, y) {
            Some(idx) => Cell::InBounds(self.cells[idx]),
            None => Cell::OutOfBounds,
        }
    }

    /// Expected bearing at `(x, y)`, if any
    pub fn expected_direction_at(&self, x: i32, y: i32) -> Option<Direction> {
        self.index(x, y).and_then(|idx| self.expected[idx])
    }

    /// Whether `(x, y)` is the FINISH cell
    pub fn is_finish(&self, x: i32, y: i32) -> bool {
        self.finish == Coord::new(x, y)
    }

    /// Check a step from `from` toward the absolute bearing `toward`.
    pub fn query(&self, from: Coord, toward: Direction) -> Query {
        let target = from.step(toward);
        match self.cell_at(target.x, target.y) {
            Cell::OutOfBounds => Query::OutOfBounds,
            Cell::InBounds(CellKind::Wall) => Query::Wall,
            Cell::InBounds(_) => {
                let expected = self.expected_direction_at(from.x, from.y);
                if expected == Some(toward) {
                    Query::Open
                } else {
                    Query::Unexpected { expected }
                }
            }
        }
    }

    /// Check a step relative to `facing`.
    pub fn query_relative(&self, from: Coord, facing: Direction, relative: Relative) -> Query {
        self.query(from, facing.relative(relative))
    }

    /// Cells visited by following expected directions from START to FINISH
    /// (inclusive).
    pub fn solution_path(&self) -> Vec<Coord> {
        let mut path = vec![self.start];
        let mut current = self.start;
        while current != self.finish {
            match self.expected_direction_at(current.x, current.y) {
                Some(direction) => {
                    current = current.step(direction);
                    path.push(current);
                }
                None => break,
            }
            if path.len() > self.cells.len() {
                break;
            }
        }
        path
    }

    /// Passable cells that are not on the solution path
    pub fn off_path_cells(&self) -> Vec<Coord> {
        let on_path: HashSet<Coord> = self.solution_path().into_iter().collect();
        let mut stray = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let at = Coord::new(x as i32, y as i32);
                if self.cells[y * self.width + x].is_passable() && !on_path.contains(&at) {
                    stray.push(at);
                }
            }
        }
        stray
    }

    /// Render the map back to text rows
    pub fn to_rows(&self) -> Vec<String> {
        self.cells
            .chunks(self.width)
            .map(|row| row.iter().map(|kind| kind.symbol()).collect())
            .collect()
    }

    /// Render the expected-direction table back to text rows
    pub fn expected_rows(&self) -> Vec<String> {
        self.expected
            .chunks(self.width)
            .map(|row| {
                row.iter()
                    .map(|bearing| bearing.map(Direction::abbreviation).unwrap_or("-"))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y * self.width + x)
    }

    fn validate_chain(&self) -> GridResult<()> {
        let mut visited = HashSet::new();
        let mut current = self.start;
        loop {
            if current == self.finish {
                return Ok(());
            }
            if !visited.insert(current) {
                return Err(GridError::ChainCycle { at: current });
            }
            let direction = self
                .expected_direction_at(current.x, current.y)
                .ok_or(GridError::BrokenChain { at: current })?;
            let next = current.step(direction);
            match self.cell_at(next.x, next.y) {
                Cell::InBounds(kind) if kind.is_passable() => current = next,
                _ => return Err(GridError::BrokenChain { at: current }),
            }
        }
    }
}
