// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "dictionary_sqlite.rs"]
pub mod dictionary_sqlite;

#[path = "samples_store.rs"]
pub mod samples_store;
