pub mod descriptor;
pub mod model_metric;
pub mod request_record;
pub mod resource_snapshot;
pub mod selection;
