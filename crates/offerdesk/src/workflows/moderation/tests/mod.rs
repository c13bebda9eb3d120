mod common;
mod idempotency;
mod review;
