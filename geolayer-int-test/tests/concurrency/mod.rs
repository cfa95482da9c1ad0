//! Snapshot isolation between readers and writers on separate threads.

mod snapshot_isolation_test;
