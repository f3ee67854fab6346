pub mod installation;
pub mod record;
