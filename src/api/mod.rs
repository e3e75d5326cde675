// JSON-line protocol over TCP.

pub mod dto;
pub mod server;
