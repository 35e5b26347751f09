pub mod init;
pub mod key;
pub mod table;
