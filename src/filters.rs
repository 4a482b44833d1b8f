use chrono::{Duration, Local, NaiveDateTime, NaiveTime};

/// Named shortcut for a relative date range, versus an explicit custom range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodPreset {
    Days7,
    Days30,
    Days90,
    Custom,
}

impl PeriodPreset {
    pub const ALL: [PeriodPreset; 4] = [
        PeriodPreset::Days7,
        PeriodPreset::Days30,
        PeriodPreset::Days90,
        PeriodPreset::Custom,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            PeriodPreset::Days7 => "7",
            PeriodPreset::Days30 => "30",
            PeriodPreset::Days90 => "90",
            PeriodPreset::Custom => "custom",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            PeriodPreset::Days7 => "Últimos 7 dias",
            PeriodPreset::Days30 => "Últimos 30 dias",
            PeriodPreset::Days90 => "Últimos 90 dias",
            PeriodPreset::Custom => "Personalizado",
        }
    }

    pub const fn days(self) -> Option<i64> {
        match self {
            PeriodPreset::Days7 => Some(7),
            PeriodPreset::Days30 => Some(30),
            PeriodPreset::Days90 => Some(90),
            PeriodPreset::Custom => None,
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.key() == key)
    }
}

/// Half-open ends mean "unbounded on that side".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

/// Ephemeral, client-only view selection for the dashboard. Empty arrays
/// mean "no restriction" on that dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    pub preset: PeriodPreset,
    pub date_range: DateRange,
    pub categories: Vec<String>,
    pub criticalities: Vec<String>,
    pub sentiments: Vec<String>,
    pub themes: Vec<String>,
    pub departments: Vec<String>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            preset: PeriodPreset::Days30,
            date_range: DateRange::default(),
            categories: Vec::new(),
            criticalities: Vec::new(),
            sentiments: Vec::new(),
            themes: Vec::new(),
            departments: Vec::new(),
        }
    }
}

impl FilterState {
    /// A non-custom preset owns the range: any explicit range is cleared.
    pub fn set_preset(&mut self, preset: PeriodPreset) {
        self.preset = preset;
        if preset != PeriodPreset::Custom {
            self.date_range = DateRange::default();
        }
    }

    /// An explicit range always forces the preset to Custom.
    pub fn set_date_range(&mut self, range: DateRange) {
        self.date_range = range;
        self.preset = PeriodPreset::Custom;
    }

    pub fn toggle_category(&mut self, value: &str) {
        toggle(&mut self.categories, value);
    }

    pub fn toggle_criticality(&mut self, value: &str) {
        toggle(&mut self.criticalities, value);
    }

    pub fn toggle_sentiment(&mut self, value: &str) {
        toggle(&mut self.sentiments, value);
    }

    pub fn toggle_theme(&mut self, value: &str) {
        toggle(&mut self.themes, value);
    }

    pub fn toggle_department(&mut self, value: &str) {
        toggle(&mut self.departments, value);
    }

    pub fn reset(&mut self) {
        *self = FilterState::default();
    }

    pub fn has_active_filters(&self) -> bool {
        !self.categories.is_empty()
            || !self.criticalities.is_empty()
            || !self.sentiments.is_empty()
            || !self.themes.is_empty()
            || !self.departments.is_empty()
            || self.preset != PeriodPreset::Days30
    }

    /// Resolves the preset into concrete local instants: start at midnight,
    /// end at 23:59:59.999. Custom passes the explicit range through as-is.
    pub fn effective_range(&self) -> DateRange {
        match self.preset.days() {
            None => self.date_range.clone(),
            Some(days) => range_ending_today(days),
        }
    }
}

fn toggle(values: &mut Vec<String>, value: &str) {
    if let Some(pos) = values.iter().position(|v| v == value) {
        values.remove(pos);
    } else {
        values.push(value.to_string());
    }
}

fn range_ending_today(days: i64) -> DateRange {
    let today = Local::now().date_naive();
    let start = (today - Duration::days(days)).and_time(NaiveTime::MIN);
    let end = today.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::milliseconds(1);
    DateRange {
        start: Some(start),
        end: Some(end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn some_range() -> DateRange {
        let start = chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_time(NaiveTime::MIN);
        let end = chrono::NaiveDate::from_ymd_opt(2026, 1, 31)
            .unwrap()
            .and_time(NaiveTime::MIN);
        DateRange {
            start: Some(start),
            end: Some(end),
        }
    }

    #[test]
    fn test_toggle_twice_is_identity() {
        let mut filters = FilterState::default();
        let before = filters.clone();
        filters.toggle_sentiment("positivo");
        assert_eq!(filters.sentiments, vec!["positivo".to_string()]);
        filters.toggle_sentiment("positivo");
        assert_eq!(filters, before);
    }

    #[test]
    fn test_toggle_never_duplicates() {
        let mut filters = FilterState::default();
        filters.toggle_category("elogio");
        filters.toggle_category("problema");
        filters.toggle_category("elogio");
        filters.toggle_category("elogio");
        assert_eq!(filters.categories, vec!["problema".to_string(), "elogio".to_string()]);
    }

    #[test]
    fn test_preset_7_spans_exactly_seven_days() {
        let mut filters = FilterState::default();
        filters.set_preset(PeriodPreset::Days7);
        let range = filters.effective_range();
        let start = range.start.unwrap();
        let end = range.end.unwrap();

        assert_eq!(start.time(), NaiveTime::MIN);
        assert_eq!(end.hour(), 23);
        assert_eq!(end.minute(), 59);
        assert_eq!(end.second(), 59);
        assert_eq!(end.and_utc().timestamp_subsec_millis(), 999);
        assert_eq!(end.date() - start.date(), Duration::days(7));
        assert_eq!(end.date(), Local::now().date_naive());
    }

    #[test]
    fn test_non_custom_preset_clears_explicit_range() {
        let mut filters = FilterState::default();
        filters.set_date_range(some_range());
        assert_eq!(filters.preset, PeriodPreset::Custom);
        filters.set_preset(PeriodPreset::Days90);
        assert_eq!(filters.date_range, DateRange::default());
    }

    #[test]
    fn test_custom_preserves_last_explicit_range() {
        let mut filters = FilterState::default();
        filters.set_date_range(some_range());
        filters.set_preset(PeriodPreset::Custom);
        assert_eq!(filters.effective_range(), some_range());
    }

    #[test]
    fn test_has_active_filters_default_is_false() {
        let filters = FilterState::default();
        assert!(!filters.has_active_filters());
    }

    #[test]
    fn test_has_active_filters_on_preset_change() {
        let mut filters = FilterState::default();
        filters.set_preset(PeriodPreset::Days7);
        assert!(filters.has_active_filters());
        filters.set_preset(PeriodPreset::Days30);
        assert!(!filters.has_active_filters());
    }

    #[test]
    fn test_has_active_filters_on_array_and_reset() {
        let mut filters = FilterState::default();
        filters.toggle_department("Financeiro");
        assert!(filters.has_active_filters());
        filters.reset();
        assert!(!filters.has_active_filters());
        assert_eq!(filters, FilterState::default());
    }
}
