
mod capacity;
mod installer;
mod worker;
