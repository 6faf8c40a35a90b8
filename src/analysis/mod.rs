// Analysis pipeline: section performance, consistency patterns and
// weather impact. The three analysers are independent of one another
// and can run in any order.

pub mod kpi;
pub mod pattern;
pub mod section;
pub mod weather;

pub use kpi::{KpiDeltas, SectionKpis};
pub use pattern::{PatternAnalyser, PatternRecommendation};
pub use section::{SectionAnalyser, SectionRecommendation};
pub use weather::{WeatherAnalyser, WeatherRecommendation};
