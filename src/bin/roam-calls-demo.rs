// src/bin/roam-calls-demo.rs

//! Call Patterns Demo Binary
//!
//! Runs the greet, calculator, and blog services over the in-process
//! transport and logs what each call pattern produces.
//!
//! Usage:
//!   cargo run --bin roam-calls-demo -- [greet|calculator|blog|all]
//!
//! Latency and buffer sizes come from the `ROAM_CALLS_*` environment
//! variables; `RUST_LOG` controls the log filter.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roam_calls::services::blog::{
    Blog, CreateBlogRequest, CreateBlogResponse, DeleteBlogRequest, DeleteBlogResponse,
    ListBlogResponse, ReadBlogRequest, ReadBlogResponse, UpdateBlogRequest, UpdateBlogResponse,
};
use roam_calls::services::calculator::{
    ComputeAverageRequest, ComputeAverageResponse, FindMaximumRequest, FindMaximumResponse,
    PrimeNumberDecompositionRequest, PrimeNumberDecompositionResponse, SquareRootRequest,
    SquareRootResponse, SumRequest, SumResponse,
};
use roam_calls::services::greet::{GreetRequest, GreetResponse, Greeting};
use roam_calls::services::{BlogService, CalculatorService, GreetService};
use roam_calls::{DocumentId, MemoryStore, PacingConfig, Result, SessionConfig, connect_local};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,roam_calls=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let which = std::env::args().nth(1).unwrap_or_else(|| "all".to_string());
    let config = SessionConfig::from_env();
    let pacing = PacingConfig::from_env();
    info!(?config, ?pacing, "starting demo");

    match which.as_str() {
        "greet" => greet_demo(&config, &pacing).await?,
        "calculator" => calculator_demo(&config).await?,
        "blog" => blog_demo(&config).await?,
        "all" => {
            greet_demo(&config, &pacing).await?;
            calculator_demo(&config).await?;
            blog_demo(&config).await?;
        }
        other => {
            return Err(format!("unknown demo {other:?}; expected greet, calculator, blog or all").into());
        }
    }
    Ok(())
}

async fn greet_demo(config: &SessionConfig, pacing: &PacingConfig) -> Result<()> {
    let service = GreetService::new(pacing.clone());
    let rama = || GreetRequest::from(Greeting::new("Liridon", "Rama"));

    let (call, _) = connect_local(service.greet(), None, config);
    let res: GreetResponse = call.unary(&rama()).await?;
    info!(result = %res.result, "greet");

    let (mut call, _) = connect_local(service.greet_many_times(), None, config);
    call.server_stream(&rama()).await?;
    while let Some(res) = call.recv::<GreetResponse>().await? {
        info!(result = %res.result, "greet many times");
    }

    let (mut call, _) = connect_local(service.long_greet(), None, config);
    for name in ["Liridon", "Arber", "Blerim", "Drilon"] {
        call.send(&GreetRequest::from(Greeting::new(name, "")))
            .await?;
    }
    let res: GreetResponse = call.close_and_recv().await?;
    info!(result = %res.result, "long greet");

    let (call, _) = connect_local(service.greet_everyone(), None, config);
    let (mut tx, mut rx) = call.split();
    let sending = tokio::spawn(async move {
        for name in ["Liridon", "Arber", "Blerim"] {
            tx.send(&GreetRequest::from(Greeting::new(name, ""))).await?;
        }
        tx.close_send().await
    });
    while let Some(res) = rx.recv::<GreetResponse>().await? {
        info!(result = %res.result, "greet everyone");
    }
    sending
        .await
        .map_err(|e| roam_calls::Status::internal(format!("sender task failed: {e}")))??;

    let generous = pacing.gate_total() + Duration::from_secs(2);
    let tight = pacing.gate_total() / 3;
    for timeout in [generous, tight] {
        let (call, _) = connect_local(service.greet_with_deadline(), Some(timeout), config);
        match call.unary::<_, GreetResponse>(&rama()).await {
            Ok(res) => info!(?timeout, result = %res.result, "greet with deadline"),
            Err(status) => warn!(?timeout, %status, "greet with deadline"),
        }
    }
    Ok(())
}

async fn calculator_demo(config: &SessionConfig) -> Result<()> {
    let service = CalculatorService::new();

    let (call, _) = connect_local(service.sum(), None, config);
    let res: SumResponse = call
        .unary(&SumRequest {
            values: vec![1.1, 1.1],
        })
        .await?;
    info!(result = res.result, "sum");

    let (mut call, _) = connect_local(service.prime_number_decomposition(), None, config);
    call.server_stream(&PrimeNumberDecompositionRequest { number: 120 })
        .await?;
    while let Some(res) = call.recv::<PrimeNumberDecompositionResponse>().await? {
        info!(prime_number = res.prime_number, "prime number decomposition");
    }

    let (mut call, _) = connect_local(service.compute_average(), None, config);
    for number in [100.1, 20.5] {
        call.send(&ComputeAverageRequest { number }).await?;
    }
    let res: ComputeAverageResponse = call.close_and_recv().await?;
    info!(result = res.result, "compute average");

    let (call, _) = connect_local(service.find_maximum(), None, config);
    let (mut tx, mut rx) = call.split();
    let sending = tokio::spawn(async move {
        for number in [100, 20, 400, -20, 1440] {
            tx.send(&FindMaximumRequest { number }).await?;
        }
        tx.close_send().await
    });
    while let Some(res) = rx.recv::<FindMaximumResponse>().await? {
        info!(result = res.result, "find maximum");
    }
    sending
        .await
        .map_err(|e| roam_calls::Status::internal(format!("sender task failed: {e}")))??;

    for number in [10.0, -4.0] {
        let (call, _) = connect_local(service.square_root(), None, config);
        match call
            .unary::<_, SquareRootResponse>(&SquareRootRequest { number })
            .await
        {
            Ok(res) => info!(number, square_root = res.square_root, "square root"),
            Err(status) => warn!(number, %status, "square root"),
        }
    }
    Ok(())
}

async fn blog_demo(config: &SessionConfig) -> Result<()> {
    let service = BlogService::new(Arc::new(MemoryStore::new()));

    let (call, _) = connect_local(service.create_blog(), None, config);
    let created: CreateBlogResponse = call
        .unary(&CreateBlogRequest {
            blog: Blog {
                author_id: DocumentId::generate().to_string(),
                title: "My first blog".to_string(),
                content: "Content of the first blog".to_string(),
                ..Blog::default()
            },
        })
        .await?;
    info!(blog = ?created.blog, "created");
    let id = created.blog.id.clone();

    let (call, _) = connect_local(service.read_blog(), None, config);
    let read: ReadBlogResponse = call
        .unary(&ReadBlogRequest {
            blog_id: id.clone(),
        })
        .await?;
    info!(blog = ?read.blog, "read");

    let (call, _) = connect_local(service.update_blog(), None, config);
    let updated: UpdateBlogResponse = call
        .unary(&UpdateBlogRequest {
            blog: Blog {
                id: id.clone(),
                title: "My first blog (edited)".to_string(),
                ..Blog::default()
            },
        })
        .await?;
    info!(blog = ?updated.blog, "updated");

    let (mut call, _) = connect_local(service.list_blog(), None, config);
    call.server_stream(&()).await?;
    while let Some(res) = call.recv::<ListBlogResponse>().await? {
        info!(blog = ?res.blog, "listed");
    }

    let (call, _) = connect_local(service.delete_blog(), None, config);
    let deleted: DeleteBlogResponse = call
        .unary(&DeleteBlogRequest {
            blog_id: id.clone(),
        })
        .await?;
    info!(blog_id = %deleted.blog_id, "deleted");

    let (call, _) = connect_local(service.read_blog(), None, config);
    if let Err(status) = call
        .unary::<_, ReadBlogResponse>(&ReadBlogRequest { blog_id: id })
        .await
    {
        info!(%status, "read after delete");
    }
    Ok(())
}
