pub mod application;
pub mod checksum;
