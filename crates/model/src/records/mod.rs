pub mod job_log;
pub mod report;
pub mod row;
pub mod run;
pub mod service;
