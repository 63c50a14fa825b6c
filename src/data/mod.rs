//! Input loading, joining and panel construction.
//!
//! Daily prices are joined with weather, fuel, production and facility
//! tables ([`DataMerger`]), collapsed to location × month and lagged into an
//! estimation [`Panel`].

mod loader;
mod merge;
mod panel;
mod quality;

pub use loader::{
    parse_date, read_facilities, read_fuel, read_prices, read_production, read_weather,
    DataError, FacilityRecord, FuelPrice, InputPaths, PriceObservation, ProductionRecord,
    SourceTables, WeatherObservation, YearMonth,
};
pub use merge::{
    DataMerger, FacilitySummary, JoinAudit, MergeReport, MergedDataset, MergedRecord,
    DISTRIBUTION_FACILITY,
};
pub use panel::{
    aggregate_monthly, CrossSection, LagSpec, MonthlyRow, Panel, PanelAssembler, PanelReport,
    SpatialDesign, MONTH_DUMMY_PREFIX, PRICE,
};
pub use quality::{DataQualityReport, MissingCount};
