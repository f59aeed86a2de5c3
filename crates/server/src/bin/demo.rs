use anyhow::Context;
use client::{log_notices, HttpBackend, SyncClient};
use domain::{NewComment, ScriptId};
use server::config::Settings;
use tokio_util::sync::CancellationToken;

const SCRIPT_ID: &str = "demo-pilot";

fn draft(script_id: &ScriptId, content: &str, start: u32, end: u32) -> NewComment {
    NewComment {
        script_id: script_id.clone(),
        parent_comment_id: None,
        content: content.to_string(),
        start_position: start,
        end_position: end,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let settings = Settings::new().context("Failed to load configuration")?;
    let host = if settings.server.host == "0.0.0.0" {
        "127.0.0.1"
    } else {
        settings.server.host.as_str()
    };
    let base_url = format!("http://{}:{}", host, settings.server.port);
    let script_id = ScriptId::new(SCRIPT_ID).map_err(anyhow::Error::msg)?;
    let cancel = CancellationToken::new();

    let writer = SyncClient::new(HttpBackend::new(&base_url, "ferris")?, settings.sync.clone())
        .with_cancel_token(cancel.clone());
    let moderator = SyncClient::new(
        HttpBackend::new(&base_url, "moderator")?.with_admin_token(&settings.security.admin_token),
        settings.sync.clone(),
    )
    .with_cancel_token(cancel.clone());
    tokio::spawn(log_notices(writer.subscribe(), cancel.clone()));

    println!("Starting scriptnotes demo against {}", base_url);

    println!("\n[1/5] Posting a comment and a reply...");
    let parent = writer
        .create_comment(draft(&script_id, "Scene 2 opens too slowly.", 120, 164))
        .await?;
    let reply = writer
        .reply(&parent.id, draft(&script_id, "Agreed, cut the first beat.", 120, 164))
        .await?;
    println!("   -> parent {} / reply {}", parent.id, reply.id);

    println!("\n[2/5] Editing the parent...");
    let edited = writer
        .edit_comment(&parent.id, "Scene 2 opens too slowly; trim the intro.")
        .await?;
    println!("   -> {}", edited.content);

    println!("\n[3/5] Hard delete while the thread is still active...");
    moderator.refresh(&script_id).await?;
    match moderator.hard_delete(&parent.id, "demo cleanup").await {
        Ok(_) => println!("   -> unexpectedly succeeded"),
        Err(e) => println!("   -> refused as expected: {}", e),
    }

    println!("\n[4/5] Soft-deleting the whole thread...");
    let marked = writer.soft_delete(&parent.id, true).await?;
    println!("   -> {} comment(s) marked deleted", marked.marked.len());

    println!("\n[5/5] Erasing the thread as moderator...");
    let outcome = moderator.hard_delete(&parent.id, "demo cleanup").await?;
    println!(
        "   -> success={} descendants_deleted={}",
        outcome.success, outcome.descendants_deleted
    );

    cancel.cancel();
    Ok(())
}
