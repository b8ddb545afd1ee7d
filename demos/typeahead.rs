//! Type-ahead search: only the last keystroke's lookup survives

use call_queue::{CancellationToken, Duration, Outcome, QueueConfig, RequestQueue, Target};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let cancel_token = CancellationToken::new();

    // "search" registers the searchTimeout timer and the currentSearchCalls collection
    let queue = RequestQueue::<String>::with_tokio(
        QueueConfig::new("typeahead", ["search"]).with_sweep_delay(Duration::from_millis(500)),
        cancel_token.clone(),
    )?;

    let mut pending = Vec::new();
    for query in ["r", "ru", "rus", "rust"] {
        let call = queue.enqueue("search").expect("search collection is registered");

        // Simulated request; aborted if a newer keystroke supersedes it
        let lookup = tokio::spawn({
            let query = query.to_string();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                format!("results for '{query}'")
            }
        });
        queue.attach_transport("search", call.id, lookup.abort_handle());

        let worker = queue.clone();
        let id = call.id;
        queue.throttled_invoke(
            Some(200),
            "search",
            "search",
            move || {
                tokio::spawn(async move {
                    match lookup.await {
                        Ok(results) => worker.resolve("search", Target::Id(id), results),
                        Err(e) => worker.reject("search", Target::Id(id), e.to_string()),
                    };
                });
            },
            Some(call.id),
        );

        pending.push((query, call.settlement));
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    for (query, settlement) in pending {
        match settlement.await? {
            Outcome::Resolved(results) => println!("{query:>5}: {results}"),
            Outcome::Rejected(error) => println!("{query:>5}: failed: {error}"),
            Outcome::Superseded(superseded) => {
                println!("{query:>5}: {} ({})", superseded.status, superseded.code)
            }
        }
    }

    // Shutdown gracefully
    queue.cancel_all();
    cancel_token.cancel();

    println!("Request queue shut down successfully!");
    Ok(())
}
