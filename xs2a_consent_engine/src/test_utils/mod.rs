//! Helpers for tests: throwaway SQLite databases, a scriptable bank connector and data fixtures.
pub mod fixtures;
pub mod mock_spi;
pub mod prepare_env;
