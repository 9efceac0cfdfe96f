//! Static report and stream tables.
//!
//! Every stream is a row in [`STREAMS`]; reports it pulls from are described by
//! a [`ReportDescriptor`]. The sync engine is driven entirely by these values.

use serde::Serialize;

use crate::date_util::{DAILY_QUERY_FORMAT, RAW_QUERY_FORMAT};
use crate::error::{Error, Result};

/// Lookback used for raw reports when neither a start date nor a bookmark exists.
pub const RAW_REPORTS_DEFAULT_LOOKBACK_DAYS: i64 = 90;

/// Column order of the raw installs / in-app events / uninstalls / ad revenue exports.
pub const RAW_EVENT_FIELDS: &[&str] = &[
    "attributed_touch_type",
    "attributed_touch_time",
    "install_time",
    "event_time",
    "event_name",
    "event_value",
    "event_revenue",
    "event_revenue_currency",
    "event_revenue_usd",
    "event_source",
    "is_receipt_validated",
    "af_prt",
    "media_source",
    "af_channel",
    "af_keywords",
    "campaign",
    "af_c_id",
    "af_adset",
    "af_adset_id",
    "af_ad",
    "af_ad_id",
    "af_ad_type",
    "af_siteid",
    "af_sub_siteid",
    "af_sub1",
    "af_sub2",
    "af_sub3",
    "af_sub4",
    "af_sub5",
    "af_cost_model",
    "af_cost_value",
    "af_cost_currency",
    "contributor1_af_prt",
    "contributor1_media_source",
    "contributor1_campaign",
    "contributor1_touch_type",
    "contributor1_touch_time",
    "contributor2_af_prt",
    "contributor2_media_source",
    "contributor2_campaign",
    "contributor2_touch_type",
    "contributor2_touch_time",
    "contributor3_af_prt",
    "contributor3_media_source",
    "contributor3_campaign",
    "contributor3_touch_type",
    "contributor3_touch_time",
    "region",
    "country_code",
    "state",
    "city",
    "postal_code",
    "dma",
    "ip",
    "wifi",
    "operator",
    "carrier",
    "language",
    "appsflyer_id",
    "advertising_id",
    "idfa",
    "android_id",
    "customer_user_id",
    "imei",
    "idfv",
    "platform",
    "device_type",
    "os_version",
    "app_version",
    "sdk_version",
    "app_id",
    "app_name",
    "bundle_id",
    "is_retargeting",
    "retargeting_conversion_type",
    "af_attribution_lookback",
    "af_reengagement_window",
    "is_primary_attribution",
    "user_agent",
    "http_referrer",
    "original_url",
];

/// Column order of the partners-by-date aggregate export.
pub const PARTNERS_FIELDS: &[&str] = &[
    "date",
    "agency",
    "media_source",
    "campaign",
    "impressions",
    "clicks",
    "ctr",
    "installs",
    "conversion_rate",
    "sessions",
    "loyal_users",
    "loyal_users_installs",
    "total_revenue",
    "total_cost",
    "roi",
    "arpu",
    "average_ecpi",
];

const RAW_KEY_PROPERTIES: &[&str] = &["event_time", "event_name", "appsflyer_id"];
const PARTNERS_KEY_PROPERTIES: &[&str] = &["date", "media_source", "campaign"];

/// Whether a report returns event-level rows or pre-aggregated daily rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    Raw,
    Daily,
}

impl ReportCategory {
    /// `from`/`to` query parameter format for this category.
    pub fn query_format(self) -> &'static str {
        match self {
            ReportCategory::Raw => RAW_QUERY_FORMAT,
            ReportCategory::Daily => DAILY_QUERY_FORMAT,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportDescriptor {
    pub report_id: &'static str,
    pub version: &'static str,
    pub max_window_days: u32,
    pub category: ReportCategory,
    pub field_order: &'static [&'static str],
    pub supports_retargeting: bool,
}

#[derive(Debug, Serialize)]
pub struct StreamSpec {
    pub stream_id: &'static str,
    pub report: &'static ReportDescriptor,
    pub key_properties: &'static [&'static str],
    pub replication_key: &'static str,
    pub retargeting: bool,
    /// Included when the config does not name a subset of streams.
    pub default_selected: bool,
}

static INSTALLS_REPORT: ReportDescriptor = raw_report("installs_report", true);
static ORGANIC_INSTALLS_REPORT: ReportDescriptor = raw_report("organic_installs_report", false);
static IN_APP_EVENTS_REPORT: ReportDescriptor = raw_report("in_app_events_report", true);
static ORGANIC_IN_APP_EVENTS_REPORT: ReportDescriptor =
    raw_report("organic_in_app_events_report", false);
static UNINSTALL_EVENTS_REPORT: ReportDescriptor = raw_report("uninstall_events_report", false);
static ORGANIC_UNINSTALL_EVENTS_REPORT: ReportDescriptor =
    raw_report("organic_uninstall_events_report", false);
static AD_REVENUE_RAW: ReportDescriptor = raw_report("ad_revenue_raw", true);
static AD_REVENUE_ORGANIC_RAW: ReportDescriptor = raw_report("ad_revenue_organic_raw", false);
static PARTNERS_BY_DATE_REPORT: ReportDescriptor = ReportDescriptor {
    report_id: "partners_by_date_report",
    version: "v5",
    max_window_days: 365,
    category: ReportCategory::Daily,
    field_order: PARTNERS_FIELDS,
    supports_retargeting: false,
};

const fn raw_report(report_id: &'static str, supports_retargeting: bool) -> ReportDescriptor {
    ReportDescriptor {
        report_id,
        version: "v5",
        max_window_days: 60,
        category: ReportCategory::Raw,
        field_order: RAW_EVENT_FIELDS,
        supports_retargeting,
    }
}

/// Every report the extractor knows how to window.
pub static REPORTS: &[&ReportDescriptor] = &[
    &INSTALLS_REPORT,
    &ORGANIC_INSTALLS_REPORT,
    &IN_APP_EVENTS_REPORT,
    &ORGANIC_IN_APP_EVENTS_REPORT,
    &UNINSTALL_EVENTS_REPORT,
    &ORGANIC_UNINSTALL_EVENTS_REPORT,
    &AD_REVENUE_RAW,
    &AD_REVENUE_ORGANIC_RAW,
    &PARTNERS_BY_DATE_REPORT,
];

/// Every stream, in the order they are synced.
pub static STREAMS: &[StreamSpec] = &[
    raw_stream("installs", &INSTALLS_REPORT, false),
    raw_stream("installs_retargeting", &INSTALLS_REPORT, true),
    raw_stream("organic_installs", &ORGANIC_INSTALLS_REPORT, false),
    raw_stream("in_app_events", &IN_APP_EVENTS_REPORT, false),
    raw_stream("in_app_events_retargeting", &IN_APP_EVENTS_REPORT, true),
    raw_stream("organic_in_app_events", &ORGANIC_IN_APP_EVENTS_REPORT, false),
    raw_stream("uninstalls", &UNINSTALL_EVENTS_REPORT, false),
    raw_stream("organic_uninstalls", &ORGANIC_UNINSTALL_EVENTS_REPORT, false),
    raw_stream("ad_revenue", &AD_REVENUE_RAW, false),
    raw_stream("organic_ad_revenue", &AD_REVENUE_ORGANIC_RAW, false),
    raw_stream("ad_revenue_retargeting", &AD_REVENUE_RAW, true),
    StreamSpec {
        stream_id: "partners_by_date",
        report: &PARTNERS_BY_DATE_REPORT,
        key_properties: PARTNERS_KEY_PROPERTIES,
        replication_key: "date",
        retargeting: false,
        default_selected: false,
    },
];

const fn raw_stream(
    stream_id: &'static str,
    report: &'static ReportDescriptor,
    retargeting: bool,
) -> StreamSpec {
    StreamSpec {
        stream_id,
        report,
        key_properties: RAW_KEY_PROPERTIES,
        replication_key: "event_time",
        retargeting,
        default_selected: true,
    }
}

/// Look up a report by id.
pub fn report(report_id: &str) -> Result<&'static ReportDescriptor> {
    REPORTS
        .iter()
        .copied()
        .find(|r| r.report_id == report_id)
        .ok_or_else(|| Error::UnknownReport(report_id.to_string()))
}

/// Maximum query window, in days, the API accepts for `report_id`.
pub fn max_window_days(report_id: &str) -> Result<u32> {
    report(report_id).map(|r| r.max_window_days)
}

/// Look up a stream by id.
pub fn stream(stream_id: &str) -> Result<&'static StreamSpec> {
    STREAMS
        .iter()
        .find(|s| s.stream_id == stream_id)
        .ok_or_else(|| Error::UnknownStream(stream_id.to_string()))
}

/// Resolve the streams to sync. `None` (or an empty list) selects the default
/// set; otherwise the named streams are returned in catalog order.
pub fn select_streams(selected: Option<&[String]>) -> Result<Vec<&'static StreamSpec>> {
    match selected {
        Some(ids) if !ids.is_empty() => {
            for id in ids {
                stream(id)?;
            }
            Ok(STREAMS
                .iter()
                .filter(|s| ids.iter().any(|id| id == s.stream_id))
                .collect())
        }
        _ => Ok(STREAMS.iter().filter(|s| s.default_selected).collect()),
    }
}
