mod command_view;
mod event_view;
mod lifecycle_view;
mod listen_view;
mod painter;
mod record_view;
mod table;

pub(crate) use self::command_view::CommandView;
pub(crate) use self::event_view::EventView;
pub(crate) use self::listen_view::{ListenOutputView, ListenSummaryView};
pub(crate) use self::painter::Painter;
pub(crate) use self::record_view::RecordView;
