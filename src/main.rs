use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use bigroad::advisor;
use bigroad::config::Config;
use bigroad::desk::{Action, Desk, Presenter, RoadView};
use bigroad::ledger::Ledger;
use bigroad::logging::{json_log, log, obj, v_str, Domain, Level};
use bigroad::session::Rejection;
use bigroad::store::Busy;

/// Writes each frame to one PNG and prints the caption and buttons.
struct FilePresenter {
    path: PathBuf,
}

#[async_trait]
impl Presenter for FilePresenter {
    async fn present(&self, view: &RoadView) -> Result<()> {
        view.image.save_png(&self.path)?;
        eprintln!("--- {} ---", self.path.display());
        eprintln!("{}", view.caption);
        for row in &view.keyboard {
            let labels: Vec<String> = row
                .iter()
                .map(|b| format!("[{}: {}]", b.label, b.action.code()))
                .collect();
            eprintln!("{}", labels.join(" "));
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let mut ledger = Ledger::new(&cfg.sqlite_path)?;
    ledger.init()?;
    let advisor = advisor::from_config(&cfg)?;
    let presenter = Arc::new(FilePresenter { path: PathBuf::from(&cfg.output_path) });
    let desk = Desk::new(ledger, advisor, presenter, cfg.road_layout())
        .with_loss_appends_round(cfg.loss_appends_round)
        .with_prompt_limit(cfg.ledger_prompt_limit);

    json_log(
        "startup",
        obj(&[
            ("sqlite_path", v_str(&cfg.sqlite_path)),
            ("output", v_str(&cfg.output_path)),
            ("username", v_str(&cfg.username)),
        ]),
    );

    let user = cfg.user_id;
    desk.start(user, &cfg.username).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        let action = match line.parse::<Action>() {
            Ok(a) => a,
            Err(err) => {
                eprintln!("{} (try p, b, t, next, prev, ai, win, loss, reset, quit)", err);
                continue;
            }
        };
        if let Err(err) = desk.handle(user, action).await {
            if err.downcast_ref::<Busy>().is_some() || err.downcast_ref::<Rejection>().is_some() {
                eprintln!("{}", err);
            } else {
                log(
                    Level::Error,
                    Domain::System,
                    "action_failed",
                    obj(&[("action", v_str(action.code())), ("error", v_str(&format!("{:#}", err)))]),
                );
            }
        }
    }

    desk.close(user).await;
    json_log("shutdown", obj(&[("status", v_str("ok"))]));
    Ok(())
}
