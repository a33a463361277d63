//! Admission control: fixed-window counting, strikes and blacklisting.

mod controller;
mod decision;
mod events;
mod lists;
mod record;
mod stores;

pub use controller::AdmissionController;
pub use decision::Decision;
pub use events::{AdmissionEvent, EventSink, TracingSink};
pub use lists::AccessLists;
pub use record::RequestRecord;
pub use stores::CounterStores;
