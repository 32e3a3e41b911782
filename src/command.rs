//! Command and marker types for the stress stream.
//!
//! Commands are the per-worker lines the engine under test dispatches.
//! Markers are the lifecycle lines that frame them.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Order side
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    /// Buy side, rendered `B`
    Buy = 0,
    /// Sell side, rendered `S`
    Sell = 1,
}

impl Side {
    /// Wire token for this side
    #[inline]
    pub const fn as_char(self) -> char {
        match self {
            Side::Buy => 'B',
            Side::Sell => 'S',
        }
    }
}

/// Traded symbol, rendered `SYM<n>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Instrument(pub u32);

impl Instrument {
    const PREFIX: &'static str = "SYM";
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

impl FromStr for Instrument {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(Self::PREFIX)
            .and_then(parse_decimal::<u32>)
            .map(Instrument)
            .ok_or_else(|| ParseError::Instrument(s.to_string()))
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Place a new limit order on a worker thread
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaceOrder {
    /// Consumer worker that owns the order
    pub thread_id: u32,
    /// Sequential order ID (0, 1, 2, ...)
    pub order_id: u64,
    /// Order side
    pub side: Side,
    /// Traded symbol
    pub instrument: Instrument,
    /// Integer limit price
    pub price: u32,
    /// Order quantity
    pub qty: u32,
}

/// Cancel a previously placed order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CancelOrder {
    /// Worker the order was placed on
    pub thread_id: u32,
    /// Order ID to cancel
    pub order_id: u64,
}

/// One command line of the stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Buy or sell
    Place(PlaceOrder),
    /// Cancel an earlier order
    Cancel(CancelOrder),
}

impl Command {
    /// Worker this command is routed to
    #[inline]
    pub fn thread_id(&self) -> u32 {
        match self {
            Command::Place(o) => o.thread_id,
            Command::Cancel(c) => c.thread_id,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Place(o) => write!(
                f,
                "{} {} {} {} {} {}",
                o.thread_id,
                o.side.as_char(),
                o.order_id,
                o.instrument,
                o.price,
                o.qty
            ),
            Command::Cancel(c) => write!(f, "{} C {}", c.thread_id, c.order_id),
        }
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split(' ').collect();
        let thread_id = parse_field(&fields, 0, "thread_id")?;

        match fields.get(1).copied() {
            Some(kind @ ("B" | "S")) => {
                if fields.len() != 6 {
                    return Err(ParseError::FieldCount { expected: 6, found: fields.len() });
                }
                Ok(Command::Place(PlaceOrder {
                    thread_id,
                    order_id: parse_field(&fields, 2, "order_id")?,
                    side: if kind == "B" { Side::Buy } else { Side::Sell },
                    instrument: fields[3].parse()?,
                    price: parse_field(&fields, 4, "price")?,
                    qty: parse_field(&fields, 5, "quantity")?,
                }))
            }
            Some("C") => {
                if fields.len() != 3 {
                    return Err(ParseError::FieldCount { expected: 3, found: fields.len() });
                }
                Ok(Command::Cancel(CancelOrder {
                    thread_id,
                    order_id: parse_field(&fields, 2, "order_id")?,
                }))
            }
            Some(other) => Err(ParseError::Kind(other.to_string())),
            None => Err(ParseError::FieldCount { expected: 3, found: fields.len() }),
        }
    }
}

/// Parse an unsigned field written as plain ASCII digits.
///
/// `FromStr` for integers also takes a leading `+`, which the wire format
/// never contains.
pub fn parse_decimal<T: FromStr>(raw: &str) -> Option<T> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

fn parse_field<T: FromStr>(
    fields: &[&str],
    idx: usize,
    name: &'static str,
) -> Result<T, ParseError> {
    let raw = fields.get(idx).copied().unwrap_or("");
    parse_decimal(raw).ok_or_else(|| ParseError::Number { field: name, value: raw.to_string() })
}

// ============================================================================
// Markers
// ============================================================================

/// Single-token lifecycle lines
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    /// `o`: spin up the worker threads
    Open,
    /// `.`: synchronize all workers before processing
    Barrier,
    /// `x`: end of stream, shut workers down
    Close,
}

impl Marker {
    pub const fn token(self) -> &'static str {
        match self {
            Marker::Open => "o",
            Marker::Barrier => ".",
            Marker::Close => "x",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Marker {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "o" => Ok(Marker::Open),
            "." => Ok(Marker::Barrier),
            "x" => Ok(Marker::Close),
            other => Err(ParseError::Marker(other.to_string())),
        }
    }
}

/// Malformed stream line
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("invalid {field}: {value:?}")]
    Number { field: &'static str, value: String },

    #[error("unknown command kind {0:?}")]
    Kind(String),

    #[error("invalid instrument {0:?}")]
    Instrument(String),

    #[error("unknown marker {0:?}")]
    Marker(String),
}
