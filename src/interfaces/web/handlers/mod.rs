pub(super) mod agents;
pub(super) mod dashboard;
pub(super) mod health;
pub(super) mod schedules;
