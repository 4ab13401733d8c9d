// Kernel - infrastructure and the change-detection pipeline

pub mod broker;
pub mod consumers;
pub mod image_hash;
pub mod mailer;
pub mod messages;
pub mod prober;
pub mod scheduled_tasks;
pub mod scraper;
pub mod storage;
pub mod store;
pub mod tracking;
pub mod traits;

pub use broker::{BrokerPublisher, JetStreamPublisher, TestBroker};
pub use messages::{BrowserEngine, NotifyJob, ScrapeJob};
pub use traits::{BaseMailer, BaseObjectStore, BaseProber, BaseWebsiteStore};
