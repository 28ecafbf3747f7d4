pub mod cache;
pub mod callback;
pub mod datastore;
pub mod ledger;
pub mod processor;
pub mod queue;
pub mod repository;
