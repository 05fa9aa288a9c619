pub mod byte_reader;
