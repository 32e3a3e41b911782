//! Stream Verifier - re-checks a command stream line by line.
//!
//! A naive but independent model of the stream: it tracks the owner of
//! every placed order and whether it has been cancelled, and rejects the
//! first line that breaks the stream contract. Used by the `verify`
//! subcommand and as the reference checker in the generator tests.

use std::fmt;
use std::io::{self, BufRead};

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use crate::command::{parse_decimal, Command, Instrument, Marker, ParseError, Side};
use crate::config::{CancelPolicy, GeneratorConfig};

/// First violation found in a stream. Line numbers are 1-based.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("failed to read stream: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: header must be a positive thread count, found {value:?}")]
    Header { line: u64, value: String },

    #[error("line {line}: expected {expected}, found {found:?}")]
    UnexpectedLine { line: u64, expected: &'static str, found: String },

    #[error("line {line}: {source}")]
    Parse { line: u64, source: ParseError },

    #[error("line {line}: thread {thread_id} outside pool of {num_threads}")]
    ThreadOutOfRange { line: u64, thread_id: u32, num_threads: u32 },

    #[error("line {line}: expected order id {expected}, found {found}")]
    OrderIdGap { line: u64, expected: u64, found: u64 },

    #[error("line {line}: cancel of order {order_id} which was never placed")]
    UnknownOrder { line: u64, order_id: u64 },

    #[error(
        "line {line}: cancel of order {order_id} on thread {found}, placed on thread {expected}"
    )]
    ThreadMismatch { line: u64, order_id: u64, expected: u32, found: u32 },

    #[error("line {line}: order {order_id} cancelled twice")]
    DoubleCancel { line: u64, order_id: u64 },

    #[error("line {line}: price {price} outside [{min}, {max}]")]
    PriceOutOfRange { line: u64, price: u32, min: u32, max: u32 },

    #[error("line {line}: quantity {qty} outside [{min}, {max}]")]
    QuantityOutOfRange { line: u64, qty: u32, min: u32, max: u32 },

    #[error("line {line}: instrument {instrument} outside the {num_instruments}-symbol set")]
    UnknownInstrument { line: u64, instrument: Instrument, num_instruments: u32 },

    #[error("expected {expected} commands, found {found}")]
    CommandCount { expected: u64, found: u64 },

    #[error("stream ended without close marker")]
    MissingClose,

    #[error("line {line}: content after close marker")]
    TrailingLine { line: u64 },
}

/// Optional bounds on top of the structural checks
#[derive(Clone, Debug, Default)]
pub struct VerifyLimits {
    /// Exact number of command lines
    pub orders: Option<u64>,
    pub num_instruments: Option<u32>,
    pub price: Option<(u32, u32)>,
    pub qty: Option<(u32, u32)>,
    /// Reject cancelling the same order twice
    pub live_only: bool,
}

impl VerifyLimits {
    /// Every bound a stream generated from `config` must satisfy.
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            orders: Some(config.orders),
            num_instruments: Some(config.num_instruments),
            price: Some((config.price_min, config.price_max)),
            qty: Some((config.qty_min, config.qty_max)),
            live_only: config.cancel_policy == CancelPolicy::LiveOnly,
        }
    }
}

/// What a valid stream contained
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub num_threads: u32,
    pub buys: u64,
    pub sells: u64,
    pub cancels: u64,
    /// Cancels of an order that was already cancelled
    pub repeat_cancels: u64,
    /// Placements per instrument
    pub per_instrument: FxHashMap<Instrument, u64>,
    /// Commands routed to each worker
    pub per_thread: FxHashMap<u32, u64>,
}

impl StreamSummary {
    pub fn commands(&self) -> u64 {
        self.buys + self.sells + self.cancels
    }
}

impl fmt::Display for StreamSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "threads:        {}", self.num_threads)?;
        writeln!(f, "commands:       {}", self.commands())?;
        writeln!(f, "  buys:         {}", self.buys)?;
        writeln!(f, "  sells:        {}", self.sells)?;
        writeln!(f, "  cancels:      {}", self.cancels)?;
        writeln!(f, "repeat cancels: {}", self.repeat_cancels)?;
        writeln!(f, "active threads: {}", self.per_thread.len())?;

        let mut instruments: Vec<_> = self.per_instrument.iter().collect();
        instruments.sort();
        for (instrument, count) in instruments {
            writeln!(f, "  {:<12} {}", instrument.to_string(), count)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Header,
    Open,
    Barrier,
    Commands,
    Closed,
}

pub struct StreamVerifier {
    limits: VerifyLimits,
    stage: Stage,
    line: u64,
    /// Owner thread of order `i`
    owners: Vec<u32>,
    /// Parallel to `owners`
    cancelled: Vec<bool>,
    summary: StreamSummary,
}

impl StreamVerifier {
    pub fn new(limits: VerifyLimits) -> Self {
        Self {
            limits,
            stage: Stage::Header,
            line: 0,
            owners: Vec::new(),
            cancelled: Vec::new(),
            summary: StreamSummary::default(),
        }
    }

    /// Check the next line (without its terminator).
    pub fn push_line(&mut self, text: &str) -> Result<(), VerifyError> {
        self.line += 1;
        let line = self.line;

        match self.stage {
            Stage::Header => {
                let num_threads = parse_decimal::<u32>(text)
                    .filter(|n| *n > 0)
                    .ok_or_else(|| VerifyError::Header { line, value: text.to_string() })?;
                self.summary.num_threads = num_threads;
                self.stage = Stage::Open;
            }
            Stage::Open => {
                expect_token(line, text, Marker::Open.token())?;
                self.stage = Stage::Barrier;
            }
            Stage::Barrier => {
                expect_token(line, text, Marker::Barrier.token())?;
                self.stage = Stage::Commands;
            }
            Stage::Commands if text == Marker::Close.token() => {
                self.stage = Stage::Closed;
            }
            Stage::Commands => {
                let cmd = text
                    .parse::<Command>()
                    .map_err(|source| VerifyError::Parse { line, source })?;
                self.check_command(line, cmd)?;
            }
            Stage::Closed => return Err(VerifyError::TrailingLine { line }),
        }
        Ok(())
    }

    fn check_command(&mut self, line: u64, cmd: Command) -> Result<(), VerifyError> {
        let num_threads = self.summary.num_threads;
        let thread_id = cmd.thread_id();
        if thread_id >= num_threads {
            return Err(VerifyError::ThreadOutOfRange { line, thread_id, num_threads });
        }

        match cmd {
            Command::Place(order) => {
                let expected = self.owners.len() as u64;
                if order.order_id != expected {
                    return Err(VerifyError::OrderIdGap { line, expected, found: order.order_id });
                }
                if let Some((min, max)) = self.limits.price {
                    if !(min..=max).contains(&order.price) {
                        return Err(VerifyError::PriceOutOfRange {
                            line,
                            price: order.price,
                            min,
                            max,
                        });
                    }
                }
                if let Some((min, max)) = self.limits.qty {
                    if !(min..=max).contains(&order.qty) {
                        return Err(VerifyError::QuantityOutOfRange {
                            line,
                            qty: order.qty,
                            min,
                            max,
                        });
                    }
                }
                if let Some(num_instruments) = self.limits.num_instruments {
                    if order.instrument.0 >= num_instruments {
                        return Err(VerifyError::UnknownInstrument {
                            line,
                            instrument: order.instrument,
                            num_instruments,
                        });
                    }
                }

                self.owners.push(order.thread_id);
                self.cancelled.push(false);
                *self.summary.per_instrument.entry(order.instrument).or_default() += 1;
                match order.side {
                    Side::Buy => self.summary.buys += 1,
                    Side::Sell => self.summary.sells += 1,
                }
            }
            Command::Cancel(cancel) => {
                let idx = usize::try_from(cancel.order_id)
                    .ok()
                    .filter(|idx| *idx < self.owners.len())
                    .ok_or(VerifyError::UnknownOrder { line, order_id: cancel.order_id })?;

                let expected = self.owners[idx];
                if expected != cancel.thread_id {
                    return Err(VerifyError::ThreadMismatch {
                        line,
                        order_id: cancel.order_id,
                        expected,
                        found: cancel.thread_id,
                    });
                }

                if self.cancelled[idx] {
                    if self.limits.live_only {
                        return Err(VerifyError::DoubleCancel { line, order_id: cancel.order_id });
                    }
                    self.summary.repeat_cancels += 1;
                }
                self.cancelled[idx] = true;
                self.summary.cancels += 1;
            }
        }

        *self.summary.per_thread.entry(thread_id).or_default() += 1;
        Ok(())
    }

    /// End of input: the close marker must have been seen.
    pub fn finish(self) -> Result<StreamSummary, VerifyError> {
        if self.stage != Stage::Closed {
            return Err(VerifyError::MissingClose);
        }
        if let Some(expected) = self.limits.orders {
            let found = self.summary.commands();
            if found != expected {
                return Err(VerifyError::CommandCount { expected, found });
            }
        }
        debug!(lines = self.line, commands = self.summary.commands(), "stream verified");
        Ok(self.summary)
    }
}

fn expect_token(line: u64, text: &str, expected: &'static str) -> Result<(), VerifyError> {
    if text == expected {
        Ok(())
    } else {
        Err(VerifyError::UnexpectedLine { line, expected, found: text.to_string() })
    }
}

/// Verify a whole stream from a reader.
pub fn verify_reader<R: BufRead>(
    reader: R,
    limits: VerifyLimits,
) -> Result<StreamSummary, VerifyError> {
    let mut verifier = StreamVerifier::new(limits);
    for line in reader.lines() {
        verifier.push_line(&line?)?;
    }
    verifier.finish()
}

/// Verify an in-memory stream.
pub fn verify_str(stream: &str, limits: VerifyLimits) -> Result<StreamSummary, VerifyError> {
    verify_reader(stream.as_bytes(), limits)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = "2\no\n.\n0 B 0 SYM0 5000 10\n1 S 1 SYM0 200 5\n0 C 0\nx\n";

    #[test]
    fn test_accepts_reference_scenario() {
        let limits = VerifyLimits::from_config(&GeneratorConfig::new(2, 3, 1));
        let summary = verify_str(SCENARIO, limits).unwrap();
        assert_eq!(summary.num_threads, 2);
        assert_eq!(summary.buys, 1);
        assert_eq!(summary.sells, 1);
        assert_eq!(summary.cancels, 1);
        assert_eq!(summary.repeat_cancels, 0);
        assert_eq!(summary.per_instrument.get(&Instrument(0)), Some(&2));
        assert_eq!(summary.per_thread.get(&0), Some(&2));
    }

    #[test]
    fn test_rejects_bad_framing() {
        let limits = VerifyLimits::default;
        assert!(matches!(
            verify_str("0\no\n.\nx\n", limits()),
            Err(VerifyError::Header { line: 1, .. })
        ));
        assert!(matches!(
            verify_str("2\n.\no\nx\n", limits()),
            Err(VerifyError::UnexpectedLine { line: 2, expected: "o", .. })
        ));
        assert!(matches!(
            verify_str("2\no\n.\n0 C 0\n", limits()),
            Err(VerifyError::UnknownOrder { line: 4, .. })
        ));
        assert!(matches!(verify_str("2\no\n.\n", limits()), Err(VerifyError::MissingClose)));
        assert!(matches!(
            verify_str("2\no\n.\nx\nx\n", limits()),
            Err(VerifyError::TrailingLine { line: 5 })
        ));
        // Integer parsing alone would take a signed header
        assert!(matches!(
            verify_str("+2\no\n.\nx\n", limits()),
            Err(VerifyError::Header { line: 1, .. })
        ));
        assert!(matches!(
            verify_str("2\no\n.\n+0 B 0 SYM0 100 1\nx\n", limits()),
            Err(VerifyError::Parse { line: 4, .. })
        ));
    }

    #[test]
    fn test_rejects_invariant_violations() {
        let limits = VerifyLimits::default;
        assert!(matches!(
            verify_str("2\no\n.\n0 B 1 SYM0 100 1\nx\n", limits()),
            Err(VerifyError::OrderIdGap { expected: 0, found: 1, .. })
        ));
        assert!(matches!(
            verify_str("2\no\n.\n0 B 0 SYM0 100 1\n1 C 0\nx\n", limits()),
            Err(VerifyError::ThreadMismatch { expected: 0, found: 1, .. })
        ));
        assert!(matches!(
            verify_str("2\no\n.\n2 B 0 SYM0 100 1\nx\n", limits()),
            Err(VerifyError::ThreadOutOfRange { thread_id: 2, num_threads: 2, .. })
        ));
        assert!(matches!(
            verify_str("2\no\n.\n0 Q 0\nx\n", limits()),
            Err(VerifyError::Parse { line: 4, .. })
        ));
    }

    #[test]
    fn test_bounds() {
        let limits = VerifyLimits::from_config(&GeneratorConfig::new(2, 1, 1));
        assert!(matches!(
            verify_str("2\no\n.\n0 B 0 SYM0 99 1\nx\n", limits.clone()),
            Err(VerifyError::PriceOutOfRange { price: 99, .. })
        ));
        assert!(matches!(
            verify_str("2\no\n.\n0 B 0 SYM0 100 101\nx\n", limits.clone()),
            Err(VerifyError::QuantityOutOfRange { qty: 101, .. })
        ));
        assert!(matches!(
            verify_str("2\no\n.\n0 B 0 SYM1 100 1\nx\n", limits.clone()),
            Err(VerifyError::UnknownInstrument { .. })
        ));
        assert!(matches!(
            verify_str("2\no\n.\nx\n", limits),
            Err(VerifyError::CommandCount { expected: 1, found: 0 })
        ));
    }

    #[test]
    fn test_double_cancel_policy() {
        let stream = "1\no\n.\n0 B 0 SYM0 100 1\n0 C 0\n0 C 0\nx\n";

        let summary = verify_str(stream, VerifyLimits::default()).unwrap();
        assert_eq!(summary.cancels, 2);
        assert_eq!(summary.repeat_cancels, 1);

        let strict = VerifyLimits { live_only: true, ..VerifyLimits::default() };
        assert!(matches!(
            verify_str(stream, strict),
            Err(VerifyError::DoubleCancel { line: 6, order_id: 0 })
        ));
    }

    #[test]
    fn test_summary_display() {
        let summary = verify_str(SCENARIO, VerifyLimits::default()).unwrap();
        let text = summary.to_string();
        assert!(text.contains("commands:       3"));
        assert!(text.contains("SYM0"));
    }
}
