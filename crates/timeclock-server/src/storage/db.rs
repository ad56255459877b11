//! `SQLite` database for the Timeclock server.

timeclock_core::define_database!(ServerDatabase, "Server database migrations complete");
