pub mod document;
pub mod metric;

pub use document::{KnowledgeDocument, PatientDocument};
pub use metric::{ChangeDirection, MetricValue};
