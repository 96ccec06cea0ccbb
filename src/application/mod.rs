pub mod bootstrap;
pub mod clock_repository;
pub mod clock_service;
pub mod commands;
pub mod focus_clock;
