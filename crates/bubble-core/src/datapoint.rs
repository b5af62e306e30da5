//! One calendar day's bundle of indicator and score values.
//!
//! Every numeric field is optional. `None` means "not yet observed for this
//! day", which is distinct from an observed `0.0`. Serialised datapoints omit
//! absent fields entirely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoEnumIterator as _, IntoStaticStr};

use crate::date::DateKey;

// ─── Field catalogue ─────────────────────────────────────────────────────────

/// Whether a field is collected from an outside source or derived from other
/// fields by the scoring process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
  Metric,
  Score,
}

/// Every optional numeric column of a datapoint. The snake_case name is the
/// stable wire and column name.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  EnumString,
  IntoStaticStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Field {
  // Valuation
  ShillerPe,
  #[serde(rename = "sp500_forward_pe")]
  #[strum(serialize = "sp500_forward_pe")]
  Sp500ForwardPe,
  NvdaPriceToSales,
  MarketConcentration,
  // Capex
  BigTechCapex,
  NvdaDataCenterRev,
  CapexToRevenueRatio,
  // Sentiment
  Vix,
  GoogleTrendsAiBubble,
  InsiderNetSelling,
  // Macro
  FedFundsRate,
  TenYearYield,
  // Derived scores
  ValuationScore,
  CapexScore,
  SentimentScore,
  MacroScore,
  BubbleIndex,
}

impl Field {
  /// Column and JSON name, e.g. `"shiller_pe"`.
  pub fn name(self) -> &'static str { self.into() }

  pub fn kind(self) -> FieldKind {
    match self {
      Field::ValuationScore
      | Field::CapexScore
      | Field::SentimentScore
      | Field::MacroScore
      | Field::BubbleIndex => FieldKind::Score,
      _ => FieldKind::Metric,
    }
  }

  /// All fields in declaration (column) order.
  pub fn all() -> impl Iterator<Item = Field> { Field::iter() }
}

impl std::fmt::Display for Field {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}

// ─── Datapoint ───────────────────────────────────────────────────────────────

/// A single stored day. `created_at` is set by the store on first insert and
/// never changes; `updated_at` advances on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
  pub date: DateKey,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shiller_pe:              Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sp500_forward_pe:        Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub nvda_price_to_sales:     Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub market_concentration:    Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub big_tech_capex:          Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub nvda_data_center_rev:    Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub capex_to_revenue_ratio:  Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub vix:                     Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub google_trends_ai_bubble: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub insider_net_selling:     Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fed_funds_rate:          Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ten_year_yield:          Option<f64>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub valuation_score: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub capex_score:     Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sentiment_score: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub macro_score:     Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bubble_index:    Option<f64>,

  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Datapoint {
  /// A datapoint with every field absent.
  pub fn empty(date: DateKey, at: DateTime<Utc>) -> Self {
    Self {
      date,
      shiller_pe: None,
      sp500_forward_pe: None,
      nvda_price_to_sales: None,
      market_concentration: None,
      big_tech_capex: None,
      nvda_data_center_rev: None,
      capex_to_revenue_ratio: None,
      vix: None,
      google_trends_ai_bubble: None,
      insider_net_selling: None,
      fed_funds_rate: None,
      ten_year_yield: None,
      valuation_score: None,
      capex_score: None,
      sentiment_score: None,
      macro_score: None,
      bubble_index: None,
      created_at: at,
      updated_at: at,
    }
  }

  fn slot(&mut self, field: Field) -> &mut Option<f64> {
    match field {
      Field::ShillerPe => &mut self.shiller_pe,
      Field::Sp500ForwardPe => &mut self.sp500_forward_pe,
      Field::NvdaPriceToSales => &mut self.nvda_price_to_sales,
      Field::MarketConcentration => &mut self.market_concentration,
      Field::BigTechCapex => &mut self.big_tech_capex,
      Field::NvdaDataCenterRev => &mut self.nvda_data_center_rev,
      Field::CapexToRevenueRatio => &mut self.capex_to_revenue_ratio,
      Field::Vix => &mut self.vix,
      Field::GoogleTrendsAiBubble => &mut self.google_trends_ai_bubble,
      Field::InsiderNetSelling => &mut self.insider_net_selling,
      Field::FedFundsRate => &mut self.fed_funds_rate,
      Field::TenYearYield => &mut self.ten_year_yield,
      Field::ValuationScore => &mut self.valuation_score,
      Field::CapexScore => &mut self.capex_score,
      Field::SentimentScore => &mut self.sentiment_score,
      Field::MacroScore => &mut self.macro_score,
      Field::BubbleIndex => &mut self.bubble_index,
    }
  }

  pub fn get(&self, field: Field) -> Option<f64> {
    match field {
      Field::ShillerPe => self.shiller_pe,
      Field::Sp500ForwardPe => self.sp500_forward_pe,
      Field::NvdaPriceToSales => self.nvda_price_to_sales,
      Field::MarketConcentration => self.market_concentration,
      Field::BigTechCapex => self.big_tech_capex,
      Field::NvdaDataCenterRev => self.nvda_data_center_rev,
      Field::CapexToRevenueRatio => self.capex_to_revenue_ratio,
      Field::Vix => self.vix,
      Field::GoogleTrendsAiBubble => self.google_trends_ai_bubble,
      Field::InsiderNetSelling => self.insider_net_selling,
      Field::FedFundsRate => self.fed_funds_rate,
      Field::TenYearYield => self.ten_year_yield,
      Field::ValuationScore => self.valuation_score,
      Field::CapexScore => self.capex_score,
      Field::SentimentScore => self.sentiment_score,
      Field::MacroScore => self.macro_score,
      Field::BubbleIndex => self.bubble_index,
    }
  }

  pub fn set(&mut self, field: Field, value: Option<f64>) {
    *self.slot(field) = value;
  }

  /// Fields that currently hold a value, in column order.
  pub fn present(&self) -> impl Iterator<Item = (Field, f64)> + '_ {
    Field::all().filter_map(|f| self.get(f).map(|v| (f, v)))
  }
}
