pub mod browser;
pub mod collector;
pub mod config;
pub mod error;
pub mod extractor;
pub mod llm;
pub mod page;
pub mod schema;
pub mod sink;
pub mod workflow;

pub use browser::Browser;
pub use collector::{collect, ElementDescriptor, CLICKABLE_SELECTORS};
pub use config::{BrowserConfig, HarvestConfig, Target};
pub use error::{Error, Result};
pub use extractor::{extract, ExtractionCapability, ExtractionMode, ExtractionRequest, PageContent};
pub use llm::OllamaExtractor;
pub use page::{Page, PageHandle};
pub use schema::{Schema, SchemaError};
pub use workflow::{end_session, RemoteSession, RunSummary, Workflow};
