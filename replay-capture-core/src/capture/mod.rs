pub mod calibrator;
pub mod capture_loop;
pub mod signal;
