pub mod checksum;
pub mod retry;
