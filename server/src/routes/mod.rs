pub mod api;
pub mod attackers;
