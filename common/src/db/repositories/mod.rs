// Repository implementations for database operations

pub mod reminder;
