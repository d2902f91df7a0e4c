mod deployments;
mod errors;
mod runs;
mod tasks;
mod verifications;
