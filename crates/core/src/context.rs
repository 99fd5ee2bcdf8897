use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::analysis::RecordTable;
use crate::config::InstrumentConfig;
use crate::db::SymbolTable;
use crate::model::VarDecl;

/// All mutable state of one instrumentation run.
///
/// Passed explicitly to every analyzer and synthesizer call; nothing in the
/// crate keeps process-wide state.
#[derive(Debug)]
pub struct RunContext {
    pub config: InstrumentConfig,
    pub symbols: SymbolTable,
    /// Struct/union definitions seen so far in visitation order.
    pub records: RecordTable,
    /// File-scope variables with global storage, in declaration order.
    pub globals: Vec<VarDecl>,
    rng: StdRng,
}

impl RunContext {
    pub fn new(config: InstrumentConfig, symbols: SymbolTable) -> Self {
        Self {
            config,
            symbols,
            records: RecordTable::new(),
            globals: Vec::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Make temporary names reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn symbol_id(&mut self, key: &str) -> u32 {
        self.symbols.get_or_insert(key)
    }

    /// Fresh temporary name: configured prefix plus a random suffix.
    ///
    /// Uniqueness is probabilistic only; nothing checks for collisions.
    pub fn fresh_temp_name(&mut self) -> String {
        let suffix: u32 = self.rng.gen_range(0..i32::MAX as u32);
        format!("{}{}", self.config.temp_prefix, suffix)
    }
}
