// Domain layer: record model, status events and ports (interfaces).

pub mod event;
pub mod model;
pub mod ports;
