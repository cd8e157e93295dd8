pub mod checksum;
pub mod snapshot_writer;
pub mod workspace;
