use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use buildsched::config::SchedulerConfig;
use buildsched::notify::TracingBroadcaster;
use buildsched::scheduler::{Build, Job, JobStatus, Repository, Scheduler};
use buildsched::scm::HttpStatusReporter;
use buildsched::shutdown::shutdown_token;
use buildsched::store::memory::MemoryStore;
use buildsched::worker::local::LocalTransport;
use buildsched::worker::registry::StaticWorkerRegistry;
use buildsched::worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "buildsched")]
#[command(about = "Run a build's jobs through the scheduler on local workers")]
struct Args {
    /// Shell command to run as one job (repeatable)
    #[arg(long = "command", required = true)]
    commands: Vec<String>,

    /// Container image to run commands in (default: directly on the host)
    #[arg(long, default_value = "")]
    image: String,

    /// Number of local workers
    #[arg(long, default_value = "1")]
    workers: usize,

    /// Concurrent job capacity per worker
    #[arg(long, default_value = "2")]
    capacity: i32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let store = MemoryStore::new();
    let jobs: Vec<Job> = args
        .commands
        .iter()
        .enumerate()
        .map(|(i, command)| Job::new(i as u64 + 1, 1, vec![command.clone()], args.image.clone()))
        .collect();
    store.insert_build(Build {
        id: 1,
        commit_sha: String::new(),
        git_ref: String::new(),
        start_time: None,
        end_time: None,
        jobs: jobs.clone(),
        repository: Repository::default(),
    });

    let transport = Arc::new(LocalTransport);
    let registry = Arc::new(StaticWorkerRegistry::new());
    for i in 0..args.workers {
        registry.register(Arc::new(Worker::new(
            format!("local-{i}"),
            args.capacity,
            transport.clone(),
        )));
    }

    let (scheduler, ready) = Scheduler::new(
        SchedulerConfig::default().with_poll_interval(Duration::from_secs(5)),
        registry,
        store.clone(),
        store.clone(),
        Arc::new(TracingBroadcaster),
        Arc::new(HttpStatusReporter::new()),
    );

    let shutdown = shutdown_token();
    let dispatch = scheduler.clone();
    let dispatch_shutdown = shutdown.clone();
    tokio::spawn(async move { dispatch.run(ready, dispatch_shutdown).await });

    for job in jobs {
        scheduler.next(job).await;
    }

    let build = loop {
        if shutdown.is_cancelled() {
            return Ok(());
        }
        match store.get_build(1) {
            Some(build) if build.end_time.is_some() => break build,
            _ => tokio::time::sleep(Duration::from_millis(200)).await,
        }
    };

    let mut failed = false;
    for job in &build.jobs {
        println!("--- job {} [{}] ---", job.id, job.status);
        print!("{}", job.log);
        if job.status != JobStatus::Passing {
            failed = true;
        }
    }
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
