pub mod device_info;
pub mod filter;
pub mod report;
