pub mod check;
pub mod command;
pub mod export;
pub mod info;
pub mod report;
