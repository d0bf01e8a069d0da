pub mod crop;
pub mod report;
pub mod reset;
