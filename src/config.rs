use crate::road::render::RenderStyle;
use crate::road::{grid, RoadLayout};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Clone, Debug)]
pub struct Config {
    pub sqlite_path: String,
    pub grid_cols: usize,
    pub cols_per_page: usize,
    pub cell_px: u32,
    pub output_path: String,
    pub advisor_api_key: Option<String>,
    pub advisor_base: String,
    pub advisor_model: String,
    pub advisor_timeout_secs: u64,
    pub advisor_max_retries: u32,
    pub advisor_breaker_threshold: u32,
    /// Past recommendations shown to the reasoning service.
    pub ledger_prompt_limit: usize,
    /// On loss feedback, record the opposite side as the round that happened.
    pub loss_appends_round: bool,
    pub user_id: i64,
    pub username: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sqlite_path: "./baccarat_stats.db".to_string(),
            grid_cols: grid::DEFAULT_GRID_COLS,
            cols_per_page: 30,
            cell_px: 22,
            output_path: "baccarat_road.png".to_string(),
            advisor_api_key: None,
            advisor_base: "https://api.openai.com/v1/".to_string(),
            advisor_model: "gpt-4o".to_string(),
            advisor_timeout_secs: 30,
            advisor_max_retries: 1,
            advisor_breaker_threshold: 5,
            ledger_prompt_limit: 20,
            loss_appends_round: true,
            user_id: 1,
            username: "console".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            sqlite_path: std::env::var("SQLITE_PATH").unwrap_or(d.sqlite_path),
            grid_cols: env_or("ROAD_GRID_COLS", d.grid_cols).max(1),
            cols_per_page: env_or("ROAD_COLS_PER_PAGE", d.cols_per_page).max(1),
            cell_px: env_or("ROAD_CELL_PX", d.cell_px),
            output_path: std::env::var("ROAD_OUTPUT").unwrap_or(d.output_path),
            advisor_api_key: std::env::var("ADVISOR_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok()
                .filter(|k| !k.trim().is_empty()),
            advisor_base: std::env::var("ADVISOR_BASE").unwrap_or(d.advisor_base),
            advisor_model: std::env::var("ADVISOR_MODEL").unwrap_or(d.advisor_model),
            advisor_timeout_secs: env_or("ADVISOR_TIMEOUT_SECS", d.advisor_timeout_secs),
            advisor_max_retries: env_or("ADVISOR_MAX_RETRIES", d.advisor_max_retries),
            advisor_breaker_threshold: env_or("ADVISOR_BREAKER_THRESHOLD", d.advisor_breaker_threshold),
            ledger_prompt_limit: env_or("LEDGER_PROMPT_LIMIT", d.ledger_prompt_limit),
            loss_appends_round: env_or("LOSS_APPENDS_ROUND", d.loss_appends_round),
            user_id: env_or("USER_ID", d.user_id),
            username: std::env::var("USERNAME").unwrap_or(d.username),
        }
    }

    pub fn road_layout(&self) -> RoadLayout {
        RoadLayout {
            grid_cols: self.grid_cols,
            cols_per_page: self.cols_per_page,
            style: RenderStyle::default().with_cell_px(self.cell_px),
        }
    }
}
