pub mod registry_service;
pub mod resource_service;
pub mod selection_service;
pub mod telemetry_service;
