mod classifier;
mod ledger;
mod penalty;
mod queue;
