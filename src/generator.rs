//! Command Stream Generator.
//!
//! Owns the RNG, the order registry and the emission counter. The stream is
//! `header -> o -> . -> N commands -> x`, written in emission order.
//!
//! The kind of each command is a uniform draw over {Buy, Sell, Cancel};
//! the Cancel arm only exists while the registry has a cancel target, so
//! a cancel can never reference an order that was not placed earlier.

use std::io::{self, BufWriter, Write};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::command::{CancelOrder, Command, Instrument, Marker, PlaceOrder, Side};
use crate::config::{ConfigError, GeneratorConfig};
use crate::registry::OrderRegistry;

/// Generation failure. Always fatal.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to write stream: {0}")]
    Io(#[from] io::Error),

    #[error("generator already emitted {emitted} commands; a stream must start from order 0")]
    AlreadyStarted { emitted: u64 },
}

/// Totals for one generated stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenerateStats {
    /// Seed the stream was generated with
    pub seed: u64,
    pub buys: u64,
    pub sells: u64,
    pub cancels: u64,
}

impl GenerateStats {
    /// Number of command lines (excludes header and markers)
    pub fn commands(&self) -> u64 {
        self.buys + self.sells + self.cancels
    }

    fn record(&mut self, cmd: &Command) {
        match cmd {
            Command::Place(o) if o.side == Side::Buy => self.buys += 1,
            Command::Place(_) => self.sells += 1,
            Command::Cancel(_) => self.cancels += 1,
        }
    }
}

/// Draw value that selects the Cancel arm
const CANCEL_DRAW: u32 = 2;

/// Upper bound on registry slots reserved up front; larger runs grow on demand
const MAX_PRESIZE: usize = 1 << 20;

pub struct Generator {
    config: GeneratorConfig,
    rng: ChaCha8Rng,
    registry: OrderRegistry,
    stats: GenerateStats,
}

impl Generator {
    /// Validate `config` and seed the RNG.
    ///
    /// Without a configured seed one is drawn from OS entropy; it is
    /// available from [`seed`](Self::seed) so the run can be reproduced.
    pub fn new(config: GeneratorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        // At most one slot per command, capped so huge runs start streaming at once
        let capacity = usize::try_from(config.orders)
            .unwrap_or(usize::MAX)
            .min(MAX_PRESIZE);
        let registry = OrderRegistry::with_capacity(config.cancel_policy, capacity);

        debug!(seed, capacity, "generator initialized");

        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            registry,
            stats: GenerateStats { seed, ..GenerateStats::default() },
            config,
        })
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.stats.seed
    }

    pub fn registry(&self) -> &OrderRegistry {
        &self.registry
    }

    pub fn stats(&self) -> GenerateStats {
        self.stats
    }

    /// Commands left before the close marker.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.config.orders - self.stats.commands()
    }

    /// Produce the next command, or `None` once `orders` have been emitted.
    pub fn next_command(&mut self) -> Option<Command> {
        if self.remaining() == 0 {
            return None;
        }

        let choices = if self.registry.has_cancel_target() { 3 } else { 2 };
        let draw = self.rng.gen_range(0..choices);

        if draw == CANCEL_DRAW {
            if let Some(target) = self.registry.pick_cancel(&mut self.rng) {
                let cmd = Command::Cancel(CancelOrder {
                    thread_id: target.thread_id,
                    order_id: target.order_id,
                });
                self.stats.record(&cmd);
                return Some(cmd);
            }
        }

        let side = if draw == 0 { Side::Buy } else { Side::Sell };
        let cmd = Command::Place(self.place(side));
        self.stats.record(&cmd);
        Some(cmd)
    }

    fn place(&mut self, side: Side) -> PlaceOrder {
        let thread_id = self.rng.gen_range(0..self.config.num_threads);
        let instrument = Instrument(self.rng.gen_range(0..self.config.num_instruments));
        let price = self.rng.gen_range(self.config.price_min..=self.config.price_max);
        let qty = self.rng.gen_range(self.config.qty_min..=self.config.qty_max);
        let order = self.registry.place(thread_id);

        PlaceOrder {
            thread_id,
            order_id: order.order_id,
            side,
            instrument,
            price,
            qty,
        }
    }

    /// Write the complete stream to `out` and return the totals.
    ///
    /// Lines are written through a single `BufWriter` in emission order and
    /// flushed before returning. A generator that has already produced
    /// commands is rejected before anything is written.
    pub fn run<W: Write>(mut self, out: W) -> Result<GenerateStats, GenerateError> {
        let emitted = self.stats.commands();
        if emitted != 0 {
            return Err(GenerateError::AlreadyStarted { emitted });
        }

        info!(
            seed = self.seed(),
            threads = self.config.num_threads,
            orders = self.config.orders,
            instruments = self.config.num_instruments,
            cancel_policy = %self.registry.policy(),
            "generating stream"
        );

        let mut out = BufWriter::new(out);
        writeln!(out, "{}", self.config.num_threads)?;
        writeln!(out, "{}", Marker::Open)?;
        writeln!(out, "{}", Marker::Barrier)?;

        while let Some(cmd) = self.next_command() {
            trace!(%cmd, "emit");
            writeln!(out, "{}", cmd)?;
        }

        writeln!(out, "{}", Marker::Close)?;
        out.flush()?;

        let stats = self.stats;
        info!(
            buys = stats.buys,
            sells = stats.sells,
            cancels = stats.cancels,
            live = self.registry.live_count(),
            "stream complete"
        );
        Ok(stats)
    }
}

impl Iterator for Generator {
    type Item = Command;

    fn next(&mut self) -> Option<Command> {
        self.next_command()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining()) {
            Ok(remaining) => (remaining, Some(remaining)),
            Err(_) => (usize::MAX, None),
        }
    }
}

/// Validate `config` and write its full stream to `out`.
///
/// Configuration errors are reported before a single byte is written.
pub fn generate<W: Write>(
    config: GeneratorConfig,
    out: W,
) -> Result<GenerateStats, GenerateError> {
    Generator::new(config)?.run(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CancelPolicy;

    fn render(config: GeneratorConfig) -> String {
        let mut buf = Vec::new();
        generate(config, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_first_command_is_never_cancel() {
        for seed in 0..200 {
            let mut gen = Generator::new(GeneratorConfig::new(4, 1, 2).with_seed(seed)).unwrap();
            assert!(matches!(gen.next_command(), Some(Command::Place(_))), "seed {}", seed);
            assert_eq!(gen.next_command(), None);
        }
    }

    #[test]
    fn test_stream_framing() {
        let out = render(GeneratorConfig::new(2, 3, 1).with_seed(42));
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 3 + 3 + 1);
        assert_eq!(&lines[..3], ["2", "o", "."]);
        assert_eq!(lines.last(), Some(&"x"));
        assert!(out.ends_with("x\n"));
    }

    #[test]
    fn test_order_ids_sequential() {
        let gen = Generator::new(GeneratorConfig::new(8, 5_000, 5).with_seed(3)).unwrap();
        let mut expected = 0u64;
        for cmd in gen {
            if let Command::Place(o) = cmd {
                assert_eq!(o.order_id, expected);
                expected += 1;
            }
        }
        assert!(expected > 0);
    }

    #[test]
    fn test_cancel_matches_placement() {
        let gen = Generator::new(GeneratorConfig::new(16, 5_000, 3).with_seed(11)).unwrap();
        let mut owners = Vec::new();
        for cmd in gen {
            match cmd {
                Command::Place(o) => owners.push(o.thread_id),
                Command::Cancel(c) => {
                    assert!((c.order_id as usize) < owners.len());
                    assert_eq!(owners[c.order_id as usize], c.thread_id);
                }
            }
        }
    }

    #[test]
    fn test_stats_and_size_hint() {
        let mut gen = Generator::new(GeneratorConfig::new(2, 100, 1).with_seed(5)).unwrap();
        assert_eq!(gen.size_hint(), (100, Some(100)));
        gen.by_ref().take(40).for_each(drop);
        assert_eq!(gen.remaining(), 60);
        assert_eq!(gen.stats().commands(), 40);
        assert_eq!(gen.registry().len() as u64, gen.stats().buys + gen.stats().sells);
    }

    #[test]
    fn test_stats_sum_to_orders() {
        let mut buf = Vec::new();
        let stats = generate(GeneratorConfig::new(3, 777, 2).with_seed(8), &mut buf).unwrap();
        assert_eq!(stats.commands(), 777);
        assert_eq!(stats.seed, 8);
    }

    #[test]
    fn test_live_only_never_repeats_cancel() {
        let config = GeneratorConfig::new(4, 10_000, 2)
            .with_seed(21)
            .with_cancel_policy(CancelPolicy::LiveOnly);
        let mut cancelled = std::collections::HashSet::new();
        for cmd in Generator::new(config).unwrap() {
            if let Command::Cancel(c) = cmd {
                assert!(cancelled.insert(c.order_id), "order {} cancelled twice", c.order_id);
            }
        }
    }

    #[test]
    fn test_unseeded_generator_reports_seed() {
        let gen = Generator::new(GeneratorConfig::new(1, 10, 1)).unwrap();
        let seed = gen.seed();
        let replay = Generator::new(GeneratorConfig::new(1, 10, 1).with_seed(seed)).unwrap();
        assert_eq!(gen.collect::<Vec<_>>(), replay.collect::<Vec<_>>());
    }

    #[test]
    fn test_run_rejects_drained_generator() {
        let mut gen = Generator::new(GeneratorConfig::new(2, 10, 1).with_seed(1)).unwrap();
        gen.by_ref().take(4).for_each(drop);

        let mut buf = Vec::new();
        let err = gen.run(&mut buf).unwrap_err();
        assert!(matches!(err, GenerateError::AlreadyStarted { emitted: 4 }));
        assert!(buf.is_empty(), "Nothing written for a drained generator");
    }

    #[test]
    fn test_huge_order_count_starts_lazily() {
        for policy in [CancelPolicy::AnyPlaced, CancelPolicy::LiveOnly] {
            let config = GeneratorConfig::new(1, u64::MAX, 1)
                .with_seed(4)
                .with_cancel_policy(policy);
            let mut gen = Generator::new(config).unwrap();
            assert_eq!(gen.remaining(), u64::MAX);
            assert!(matches!(gen.next_command(), Some(Command::Place(o)) if o.order_id == 0));
            assert_eq!(gen.registry().len(), 1);
        }
    }

    #[test]
    fn test_invalid_config_writes_nothing() {
        let mut buf = Vec::new();
        let err = generate(GeneratorConfig::new(0, 10, 1), &mut buf).unwrap_err();
        assert!(matches!(err, GenerateError::Config(ConfigError::NoThreads)));
        assert!(buf.is_empty());
    }
}
