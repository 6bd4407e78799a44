pub mod accounts;
pub mod journal;
pub mod status;
