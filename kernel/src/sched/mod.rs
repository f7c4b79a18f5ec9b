//! Priority-preemptive single-CPU scheduler (component D).

pub mod queue;
pub mod scheduler;

pub fn init() {
    scheduler::init();
}
