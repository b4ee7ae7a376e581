// Concrete collaborators behind the domain ports: the actor network and the grid environment.

pub mod actor;
pub mod voltage_control;
