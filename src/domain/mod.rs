// Domain layer: records and ports (interfaces) shared by the engine and its collaborators.

pub mod model;
pub mod ports;
