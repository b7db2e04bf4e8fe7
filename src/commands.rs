//! Handlers for the `roam` subcommands

use color_eyre::{eyre::eyre, Result};
use tokio_util::sync::CancellationToken;

use roam::api::{ChatRequest, MutationOutcome, SessionQuery};
use roam::cache::{CacheResult, CacheSource};
use roam::queue::QueueEvent;
use roam::tasks::{PollError, TaskInfo, TaskStatus};
use roam::Core;

use crate::{Command, ConnectionsCommand, QueueCommand};

pub async fn run(core: &Core, command: Command) -> Result<()> {
  match command {
    Command::Login { token, expires_in } => {
      let saved = core
        .tokens()
        .save(&token, expires_in.map(chrono::Duration::seconds))?;
      match saved.expires_at {
        Some(at) => println!("Token saved (expires {})", at.format("%Y-%m-%d %H:%M UTC")),
        None => println!("Token saved"),
      }
      return Ok(());
    }
    Command::Logout => {
      core.tokens().clear()?;
      println!("Stored token removed");
      return Ok(());
    }
    Command::Queue(QueueCommand::Clear) => {
      let removed = core.queue().clear()?;
      println!("Dropped {} pending request(s)", removed);
      return Ok(());
    }
    _ => {}
  }

  let status = core.check_connectivity().await;
  if !status.is_online {
    eprintln!("Offline: showing cached data where available");
  }

  match command {
    Command::Chat {
      message,
      session,
      project,
      sync,
      no_wait,
    } => {
      let mut request = ChatRequest::new(message);
      request.session_id = session;
      request.project_path = project;
      chat(core, request, sync, no_wait).await
    }
    Command::Task { task_id, wait } => {
      let task = if wait {
        wait_for(core, &task_id).await?
      } else {
        core.api().get_task(&task_id).await?
      };
      print_task(&task);
      Ok(())
    }
    Command::Tasks => {
      let tasks = core.api().list_tasks().await?;
      if tasks.is_empty() {
        println!("No tasks");
      }
      for task in tasks {
        println!(
          "{}  {:<9}  {}  {}",
          task.task_id,
          task.status,
          task.updated_at.format("%Y-%m-%d %H:%M"),
          preview(&task.message, 50)
        );
      }
      Ok(())
    }
    Command::Sessions { limit, project } => {
      let result = core.api().sessions(&SessionQuery { limit, project }).await?;
      note_source(&result);
      for s in &result.data.sessions {
        println!(
          "{}  {:>4} msgs  {}  {}",
          s.session_id,
          s.message_count,
          s.last_active.format("%Y-%m-%d %H:%M"),
          preview(&s.preview, 40)
        );
        println!("    {}", s.project);
      }
      Ok(())
    }
    Command::Projects => {
      let result = core.api().projects().await?;
      note_source(&result);
      for p in &result.data.projects {
        println!(
          "{:>4} sessions  {}  {}",
          p.session_count,
          p.last_active.format("%Y-%m-%d %H:%M"),
          p.path
        );
      }
      Ok(())
    }
    Command::Health => {
      let health = core.api().health().await?;
      println!("status:        {}", health.status);
      println!("claude:        {}", health.claude_version);
      println!("api key set:   {}", health.api_key_configured);
      Ok(())
    }
    Command::Connections(sub) => connections(core, sub).await,
    Command::Queue(sub) => queue(core, sub).await,
    Command::Login { .. } | Command::Logout => Ok(()),
  }
}

async fn chat(core: &Core, request: ChatRequest, sync: bool, no_wait: bool) -> Result<()> {
  if sync {
    let reply = core.api().chat(&request).await?;
    println!("{}", reply.response);
    eprintln!("session {}", reply.session_id);
    if reply.exit_code != 0 {
      return Err(eyre!("assistant exited with code {}: {}", reply.exit_code, reply.stderr));
    }
    return Ok(());
  }

  let accepted = match core.api().create_chat_task(&request).await? {
    MutationOutcome::Sent(accepted) => accepted,
    MutationOutcome::Queued(queued) => {
      println!(
        "Offline: message queued as {} and will be sent on reconnect (`roam queue flush`)",
        queued.id
      );
      return Ok(());
    }
  };

  if no_wait {
    println!("{}", accepted.task_id);
    return Ok(());
  }

  let task = wait_for(core, &accepted.task_id).await?;
  print_task(&task);
  Ok(())
}

/// Poll a task, printing status changes. Ctrl-C stops waiting.
async fn wait_for(core: &Core, task_id: &str) -> Result<TaskInfo> {
  let cancel = CancellationToken::new();
  let on_signal = cancel.clone();
  let signal = tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      on_signal.cancel();
    }
  });

  let mut last: Option<TaskStatus> = None;
  let options = core
    .config()
    .poll_options()
    .cancel_with(cancel)
    .on_progress(move |task| {
      if last != Some(task.status) {
        eprintln!("task {}: {}", task.task_id, task.status);
        last = Some(task.status);
      }
    });

  let result = core.api().wait_for_task(task_id, options).await;
  signal.abort();

  match result {
    Ok(task) => Ok(task),
    Err(PollError::Cancelled) => Err(eyre!(
      "Stopped waiting. The task keeps running; check it with `roam task {} --wait`",
      task_id
    )),
    Err(PollError::Exhausted { attempts }) => Err(eyre!(
      "Task {} still not finished after {} checks",
      task_id,
      attempts
    )),
    Err(PollError::Request(e)) => Err(eyre!("Failed to check task {}: {}", task_id, e.user_message())),
  }
}

async fn connections(core: &Core, command: ConnectionsCommand) -> Result<()> {
  match command {
    ConnectionsCommand::List => {
      let result = core.api().connections().await?;
      note_source(&result);
      if result.data.is_empty() {
        println!("No connections");
      }
      for c in &result.data {
        println!(
          "{}  {:?}  {}{}",
          c.id,
          c.provider,
          c.username.as_deref().unwrap_or("-"),
          if c.is_active { "" } else { "  (inactive)" }
        );
      }
    }
    ConnectionsCommand::Show { id } => {
      let result = core.api().connection(&id).await?;
      note_source(&result);
      let c = &result.data;
      println!("id:         {}", c.id);
      println!("provider:   {:?}", c.provider);
      if let Some(url) = &c.instance_url {
        println!("instance:   {}", url);
      }
      println!("username:   {}", c.username.as_deref().unwrap_or("-"));
      println!("email:      {}", c.email.as_deref().unwrap_or("-"));
      println!("connected:  {}", c.connected_at.format("%Y-%m-%d %H:%M"));
      println!("active:     {}", c.is_active);
    }
    ConnectionsCommand::Delete { id } => match core.api().delete_connection(&id).await? {
      MutationOutcome::Sent(()) => println!("Deleted connection {}", id),
      MutationOutcome::Queued(q) => println!("Offline: delete queued as {}", q.id),
    },
    ConnectionsCommand::Status { id } => {
      let result = core.api().connection_status(&id).await?;
      note_source(&result);
      let s = &result.data;
      println!("valid:    {}", s.is_valid);
      println!("username: {}", s.username.as_deref().unwrap_or("-"));
      println!("scopes:   {}", s.scopes.join(", "));
      println!("checked:  {}", s.last_checked.format("%Y-%m-%d %H:%M:%S"));
    }
  }
  Ok(())
}

async fn queue(core: &Core, command: QueueCommand) -> Result<()> {
  match command {
    QueueCommand::Status => {
      let pending = core.queue().snapshot();
      if pending.is_empty() {
        println!("Nothing queued");
      }
      for q in pending {
        println!(
          "{}  {:<6} {}  retries {}/{}  queued {}",
          q.id,
          q.method.as_str(),
          q.url,
          q.retry_count,
          q.max_retries,
          q.created_at.format("%Y-%m-%d %H:%M")
        );
      }
    }
    QueueCommand::Flush => {
      if !core.connectivity().is_online() {
        return Err(eyre!("Backend unreachable; {} request(s) still queued", core.queue().len()));
      }
      let _events = core.queue().on_event(|event| match event {
        QueueEvent::Replayed { request } => println!("sent      {} {}", request.method, request.url),
        QueueEvent::Rejected { request, error } => {
          println!("rejected  {} {}: {}", request.method, request.url, error.user_message())
        }
        QueueEvent::Exhausted { request, error } => {
          println!("gave up   {} {}: {}", request.method, request.url, error.user_message())
        }
      });
      let report = core.queue().process_queue().await;
      println!(
        "{} sent, {} rejected, {} failed, {} remaining",
        report.replayed, report.rejected, report.exhausted, report.remaining
      );
    }
    QueueCommand::Clear => {}
  }
  Ok(())
}

fn note_source<T>(result: &CacheResult<T>) {
  let Some(at) = result.cached_at else {
    return;
  };
  let at = at.format("%H:%M:%S");
  match result.source {
    CacheSource::CacheStale => eprintln!("(cached at {}, refreshing)", at),
    CacheSource::Offline => eprintln!("(offline, cached at {})", at),
    CacheSource::CacheFresh | CacheSource::Network => {}
  }
}

fn print_task(task: &TaskInfo) {
  match task.status {
    TaskStatus::Completed => {
      println!("{}", task.result.as_deref().unwrap_or(""));
      if let Some(session) = &task.session_id {
        eprintln!("session {}", session);
      }
    }
    TaskStatus::Failed => {
      println!("Task {} failed: {}", task.task_id, task.error.as_deref().unwrap_or("unknown error"));
      if let Some(stderr) = task.stderr.as_deref().filter(|s| !s.is_empty()) {
        eprintln!("{}", stderr);
      }
    }
    TaskStatus::Pending | TaskStatus::Running => {
      println!("Task {} is {} (updated {})", task.task_id, task.status, task.updated_at.format("%H:%M:%S"));
    }
  }
}

fn preview(text: &str, max_chars: usize) -> String {
  let line = text.lines().next().unwrap_or_default();
  if line.chars().count() <= max_chars {
    return line.to_string();
  }
  let cut: String = line.chars().take(max_chars.saturating_sub(1)).collect();
  format!("{}…", cut)
}
