use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
    MemoryJournal,
}

impl JournalMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
            JournalMode::MemoryJournal => "MEMORY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Synchronous {
    Full,
    #[default]
    Normal,
    Off,
}

impl Synchronous {
    pub fn pragma_value(self) -> &'static str {
        match self {
            Synchronous::Full => "FULL",
            Synchronous::Normal => "NORMAL",
            Synchronous::Off => "OFF",
        }
    }
}

/// Runtime configuration for a ledger store connection.
#[derive(Debug, Clone)]
pub struct LfndbConfig {
    /// Upper bound on lock waits before a busy error surfaces to the caller.
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
    pub synchronous: Synchronous,
    pub foreign_keys: bool,
}

impl Default for LfndbConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            journal_mode: JournalMode::Wal,
            synchronous: Synchronous::Normal,
            foreign_keys: true,
        }
    }
}

impl LfndbConfig {
    /// Full-sync profile for ledgers that must survive power loss between
    /// upload rounds.
    pub fn durable() -> Self {
        Self {
            synchronous: Synchronous::Full,
            ..Self::default()
        }
    }

    /// Throwaway profile for harnesses and scratch ledgers.
    pub fn ephemeral() -> Self {
        Self {
            journal_mode: JournalMode::MemoryJournal,
            synchronous: Synchronous::Off,
            ..Self::default()
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn enforces_relations(&self) -> bool {
        self.foreign_keys
    }
}
