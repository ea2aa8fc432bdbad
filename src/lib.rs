pub mod aggregate;
pub mod calendar;
pub mod compare;
pub mod data_loader;
pub mod error;
pub mod layout;
pub mod model;
pub mod models;
pub mod session;

pub use calendar::{build_base_table, HolidayCalendar};
pub use error::{ExplorerError, Result};
pub use model::{ModelFit, ModelSummary};
pub use models::{
    BenchmarkTable, ColorDim, DateRange, DayType, Geometry, GroupDim, IntervalReading, Predictor,
    Season, SelectionState, Stat,
};
pub use session::{Input, Session};
