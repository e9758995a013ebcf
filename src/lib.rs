pub mod alert;
pub mod audio;
pub mod cli;
pub mod config;
pub mod density;
pub mod detection;
pub mod email;
pub mod event_log;
pub mod notify;
pub mod occupancy;
pub mod pipeline;
pub mod progress;
pub mod tracker;
pub mod yolo;
pub mod zone;
