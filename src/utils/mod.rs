pub mod file_io;

pub mod poll;
