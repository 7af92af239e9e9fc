use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use factory_procurement::abstractions::communication::fair_loss_point_to_point_links::FairLossConfig;
use factory_procurement::abstractions::communication::udp::UdpLink;
use factory_procurement::abstractions::communication::{LinkSender, LocalProcessFactory};
use factory_procurement::config::Staffing;
use factory_procurement::factory::worker::WorkerProfile;
use factory_procurement::{
    FactoryConfig, FactoryServer, Message, Procurement, ProcurementConfig, ProcurementError,
    Reconciliation,
};

const FACTORY: usize = 0;
const PROCUREMENT: usize = 1;

fn uniform(workers: u32, capacity: u32) -> FactoryConfig {
    FactoryConfig::builder()
        .workers(workers)
        .uniform(capacity, Duration::from_millis(2))
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_parts_four_factories_over_udp() {
    let (factory_tx, factory_rx) = UdpLink::bind("127.0.0.1:0").await.unwrap();
    let factory_addr = factory_rx.local_addr().unwrap();
    let server = FactoryServer::new(uniform(4, 25), factory_tx, factory_rx).unwrap();
    let serving = tokio::spawn(server.serve_one(CancellationToken::new()));

    let (tx, rx) = UdpLink::bind("127.0.0.1:0").await.unwrap();
    let mut procurement = Procurement::new(
        tx,
        rx,
        ProcurementConfig {
            confirm_timeout: Some(Duration::from_secs(5)),
            report_timeout: Some(Duration::from_secs(5)),
        },
    );

    let report = procurement.place_order(100, factory_addr).await.unwrap();
    assert_eq!(report.order_size, 100);
    assert_eq!(report.worker_count, 4);
    assert_eq!(report.completed(), 4);
    assert_eq!(report.grand_total(), 100);
    assert_eq!(report.reconcile(), Reconciliation::Match);
    let productions: u32 = report.workers.values().map(|w| w.iterations).sum();
    assert!(productions >= 4);

    let summary = serving.await.unwrap().unwrap();
    assert_eq!(summary.grand_total, 100);
    for worker in &summary.workers {
        let tally = report.workers[&worker.id];
        assert_eq!(tally.units_produced, u64::from(worker.units_produced));
        assert_eq!(tally.iterations, worker.iterations);
        assert_eq!(tally.reported_total, Some(worker.units_produced));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn orders_are_served_back_to_back() {
    let mut links = LocalProcessFactory::<usize, Message>::new();
    let (factory_tx, factory_rx) = links.new_local_process_link(FACTORY);
    let (tx, rx) = links.new_local_process_link(PROCUREMENT);

    let config = FactoryConfig::builder()
        .workers(5)
        .staffing(Staffing::Random {
            capacity: 1..=9,
            duration_ms: 1..=3,
            seed: Some(11),
        })
        .build()
        .unwrap();
    let server = FactoryServer::new(config, factory_tx, factory_rx).unwrap();
    let cancel_token = CancellationToken::new();
    let serving = tokio::spawn(server.serve(cancel_token.clone()));

    let mut procurement = Procurement::new(tx, rx, ProcurementConfig::default());
    for quantity in [0, 1, 37, 120] {
        let report = procurement.place_order(quantity, FACTORY).await.unwrap();
        assert_eq!(report.grand_total(), u64::from(quantity));
        assert_eq!(report.completed(), 5);
    }

    cancel_token.cancel();
    serving.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_factory_needs_ceil_iterations() {
    let mut links = LocalProcessFactory::<usize, Message>::new();
    let (factory_tx, factory_rx) = links.new_local_process_link(FACTORY);
    let (tx, rx) = links.new_local_process_link(PROCUREMENT);
    let server = FactoryServer::new(uniform(1, 7), factory_tx, factory_rx).unwrap();
    let serving = tokio::spawn(server.serve_one(CancellationToken::new()));

    let report = Procurement::new(tx, rx, ProcurementConfig::default())
        .place_order(50, FACTORY)
        .await
        .unwrap();
    assert_eq!(report.workers[&1].iterations, 8);
    assert_eq!(report.grand_total(), 50);
    assert_eq!(serving.await.unwrap().unwrap().workers[0].iterations, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_mid_order_aborts_procurement() {
    let mut links = LocalProcessFactory::<usize, Message>::new();
    let (factory_tx, factory_rx) = links.new_local_process_link(FACTORY);
    let (tx, rx) = links.new_local_process_link(PROCUREMENT);
    let config = FactoryConfig::builder()
        .workers(3)
        .staffing(Staffing::Fixed(vec![WorkerProfile {
            capacity: 1,
            duration: Duration::from_millis(10),
        }]))
        .build()
        .unwrap();
    let server = FactoryServer::new(config, factory_tx, factory_rx).unwrap();
    let cancel_token = CancellationToken::new();
    let serving = tokio::spawn(server.serve(cancel_token.clone()));

    let canceller = cancel_token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = Procurement::new(tx, rx, ProcurementConfig::default())
        .place_order(10_000, FACTORY)
        .await;
    assert!(matches!(result, Err(ProcurementError::ProtocolError)));
    serving.await.unwrap().unwrap();
}

/// Drops every completion report, leaving the requester waiting.
struct LoseCompletions<L> {
    inner: L,
    lost: AtomicU32,
}

impl<L> LinkSender<usize, Message> for LoseCompletions<L>
where
    L: LinkSender<usize, Message> + Send + Sync,
{
    async fn send(&self, to: usize, message: Message) -> io::Result<()> {
        if let Message::Completion { .. } = message {
            self.lost.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        self.inner.send(to, message).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lost_completion_blocks_until_timeout() {
    let mut links = LocalProcessFactory::<usize, Message>::new();
    let (factory_tx, factory_rx) = links.new_local_process_link(FACTORY);
    let (tx, rx) = links.new_local_process_link(PROCUREMENT);
    let lossy = Arc::new(LoseCompletions {
        inner: factory_tx,
        lost: AtomicU32::new(0),
    });
    let server = FactoryServer::new(uniform(2, 5), lossy.clone(), factory_rx).unwrap();
    let summary = tokio::spawn(server.serve_one(CancellationToken::new()));

    let mut procurement = Procurement::new(
        tx,
        rx,
        ProcurementConfig {
            confirm_timeout: None,
            report_timeout: Some(Duration::from_millis(200)),
        },
    );
    let result = procurement.place_order(20, FACTORY).await;
    assert!(matches!(
        result,
        Err(ProcurementError::Timeout("production reports"))
    ));

    // The factory itself finished the order; only the reports went missing.
    assert_eq!(summary.await.unwrap().unwrap().grand_total, 20);
    assert_eq!(lossy.lost.load(Ordering::Relaxed), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fully_lossy_link_never_confirms() {
    let (factory_tx, factory_rx) = UdpLink::bind("127.0.0.1:0").await.unwrap();
    let factory_addr: SocketAddr = factory_rx.local_addr().unwrap();
    let config = FactoryConfig::builder()
        .workers(1)
        .link(FairLossConfig::new(1.0, 0.0).unwrap())
        .build()
        .unwrap();
    let server = FactoryServer::new(config, factory_tx, factory_rx).unwrap();
    let stats = server.link_stats();
    let cancel_token = CancellationToken::new();
    let serving = tokio::spawn(server.serve(cancel_token.clone()));

    let (tx, rx) = UdpLink::bind("127.0.0.1:0").await.unwrap();
    let result = Procurement::new(
        tx,
        rx,
        ProcurementConfig {
            confirm_timeout: Some(Duration::from_millis(100)),
            report_timeout: None,
        },
    )
    .place_order(3, factory_addr)
    .await;
    assert!(matches!(
        result,
        Err(ProcurementError::Timeout("order confirmation"))
    ));

    cancel_token.cancel();
    serving.await.unwrap().unwrap();
    let (offered, dropped, _) = stats.snapshot();
    assert!(offered >= 1);
    assert_eq!(offered, dropped);
}
