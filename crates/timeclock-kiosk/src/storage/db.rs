//! Queue database handles.

timeclock_core::define_database!(
    PunchQueueDb,
    "Punch queue migrations complete",
    "./migrations/punch_queue"
);

timeclock_core::define_database!(
    PhotoQueueDb,
    "Photo queue migrations complete",
    "./migrations/photo_queue"
);
