use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use roam_calls::services::calculator::{
    ComputeAverageRequest, ComputeAverageResponse, FindMaximumRequest, FindMaximumResponse,
    PrimeNumberDecompositionRequest, PrimeNumberDecompositionResponse, SquareRootRequest,
    SquareRootResponse, SumRequest, SumResponse,
};
use roam_calls::services::greet::{GreetRequest, GreetResponse, Greeting};
use roam_calls::services::{CalculatorService, GreetService};
use roam_calls::{
    ChannelError, Code, DeadlineContext, Frame, FrameRx, FrameTx, Handler, Inbound, MemoryChannel,
    MemoryRx, MemoryTx, MessageChannel, Outbound, PacingConfig, Pattern, Session, SessionConfig,
    Status, codec, connect_local, memory_channel_pair,
};

fn config() -> SessionConfig {
    SessionConfig::default()
}

fn greet_service() -> GreetService {
    GreetService::new(PacingConfig::immediate())
}

#[tokio::test]
async fn unary_sum() {
    let (call, serving) = connect_local(CalculatorService::new().sum(), None, &config());
    let res: SumResponse = call
        .unary(&SumRequest {
            values: vec![1.1, 1.1],
        })
        .await
        .expect("sum should succeed");

    assert_eq!(res.result, 2.2);
    assert!(serving.await.expect("session task").is_ok());
}

#[tokio::test]
async fn server_stream_prime_factors() {
    let (mut call, serving) =
        connect_local(CalculatorService::new().prime_number_decomposition(), None, &config());
    call.server_stream(&PrimeNumberDecompositionRequest { number: 12 })
        .await
        .expect("request should be sent");

    let factors: Vec<u64> = call
        .recv_all::<PrimeNumberDecompositionResponse>()
        .await
        .expect("stream should end cleanly")
        .into_iter()
        .map(|res| res.prime_number)
        .collect();
    assert_eq!(factors, [2, 2, 3]);
    assert!(serving.await.expect("session task").is_ok());
}

#[tokio::test]
async fn client_stream_average() {
    let (mut call, serving) =
        connect_local(CalculatorService::new().compute_average(), None, &config());
    for number in [100.1, 20.5] {
        call.send(&ComputeAverageRequest { number })
            .await
            .expect("send should succeed");
    }
    let res: ComputeAverageResponse = call.close_and_recv().await.expect("average");

    assert!((res.result - 60.3).abs() < 1e-9, "got {}", res.result);
    assert!(serving.await.expect("session task").is_ok());
}

#[tokio::test]
async fn bidi_stream_maximum() {
    let (call, serving) = connect_local(CalculatorService::new().find_maximum(), None, &config());
    let (mut tx, mut rx) = call.split();

    let sending = tokio::spawn(async move {
        for number in [100, 20, 400, -20, 1440] {
            tx.send(&FindMaximumRequest { number }).await?;
        }
        tx.close_send().await
    });

    let maxima: Vec<i32> = rx
        .recv_all::<FindMaximumResponse>()
        .await
        .expect("stream should end cleanly")
        .into_iter()
        .map(|res| res.result)
        .collect();
    assert_eq!(maxima, [100, 100, 400, 400, 1440]);

    sending.await.expect("sender task").expect("sends");
    assert!(serving.await.expect("session task").is_ok());
    assert!(rx.status().expect("finished").is_ok());
}

#[tokio::test]
async fn greet_patterns() {
    let service = greet_service();
    let ada = || GreetRequest::from(Greeting::new("Ada", "Lovelace"));

    let (call, _) = connect_local(service.greet(), None, &config());
    let res: GreetResponse = call.unary(&ada()).await.expect("greet");
    assert_eq!(res.result, "Hello, Ada Lovelace");

    let (mut call, _) = connect_local(service.greet_many_times(), None, &config());
    call.server_stream(&ada()).await.expect("request");
    let all = call.recv_all::<GreetResponse>().await.expect("stream");
    assert_eq!(all.len(), 10);
    assert_eq!(all[0].result, "Hello Ada number 1");
    assert_eq!(all[9].result, "Hello Ada number 10");

    let (mut call, _) = connect_local(service.long_greet(), None, &config());
    for name in ["Ada", "Grace"] {
        call.send(&GreetRequest::from(Greeting::new(name, "")))
            .await
            .expect("send");
    }
    let res: GreetResponse = call.close_and_recv().await.expect("long greet");
    assert_eq!(res.result, "Hello Ada! \nGrace! \n");

    let (mut call, _) = connect_local(service.greet_everyone(), None, &config());
    call.send(&ada()).await.expect("send");
    let first = call.recv::<GreetResponse>().await.expect("reply");
    assert_eq!(first.map(|r| r.result).as_deref(), Some("Hello, Ada!"));
    call.close_send().await.expect("close");
    assert_eq!(call.recv::<GreetResponse>().await.expect("end"), None);

    let (call, _) = connect_local(service.greet_with_deadline(), None, &config());
    let res: GreetResponse = call.unary(&ada()).await.expect("gated greet");
    assert_eq!(res.result, "Hello, Ada Lovelace");
}

#[tokio::test]
async fn square_root_rejects_negative_input() {
    let service = CalculatorService::new();

    let (call, _) = connect_local(service.square_root(), None, &config());
    let res: SquareRootResponse = call
        .unary(&SquareRootRequest { number: 81.0 })
        .await
        .expect("square root");
    assert_eq!(res.square_root, 9.0);

    let (call, serving) = connect_local(service.square_root(), None, &config());
    let err = call
        .unary::<_, SquareRootResponse>(&SquareRootRequest { number: -4.0 })
        .await
        .expect_err("negative input must fail");
    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(err.message(), "received a negative number: -4");
    assert_eq!(serving.await.expect("session task"), err);
}

#[tokio::test]
async fn non_positive_decomposition_is_invalid() {
    for number in [0, -12] {
        let (mut call, serving) =
            connect_local(CalculatorService::new().prime_number_decomposition(), None, &config());
        call.server_stream(&PrimeNumberDecompositionRequest { number })
            .await
            .expect("request");
        let err = call
            .recv::<PrimeNumberDecompositionResponse>()
            .await
            .expect_err("no factors for non-positive input");
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(serving.await.expect("session task").code(), Code::InvalidArgument);
    }
}

#[tokio::test]
async fn malformed_request_is_invalid_argument() {
    let (call, serving) = connect_local(CalculatorService::new().sum(), None, &config());
    let err = call
        .unary::<_, SumResponse>(&"definitely not a list of numbers".to_string())
        .await
        .expect_err("decode must fail");

    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(serving.await.expect("session task").code(), Code::InvalidArgument);
}

#[tokio::test]
async fn empty_client_stream_still_terminates() {
    let (call, serving) =
        connect_local(CalculatorService::new().compute_average(), None, &config());
    let err = call
        .close_and_recv::<ComputeAverageResponse>()
        .await
        .expect_err("average of nothing");
    assert_eq!(err.code(), Code::InvalidArgument);
    assert!(err.message().contains("division undefined"));
    assert_eq!(serving.await.expect("session task"), err);

    let (call, serving) = connect_local(greet_service().long_greet(), None, &config());
    let res: GreetResponse = call.close_and_recv().await.expect("empty long greet");
    assert_eq!(res.result, "Hello ");
    assert!(serving.await.expect("session task").is_ok());
}

#[tokio::test]
async fn bidi_directions_do_not_wait_on_each_other() {
    // Produces before consuming anything; the caller only sends once it has
    // seen every produced message.
    let handler = Handler::bidi_stream(
        |_, mut inbound: Inbound<u32>, out: Outbound<u32>| async move {
            for n in 0..3 {
                out.send(&n).await?;
            }
            let mut echoed = 0;
            while let Some(n) = inbound.recv().await? {
                out.send(&(n + 100)).await?;
                echoed += 1;
            }
            if echoed == 2 {
                Ok(())
            } else {
                Err(Status::internal(format!("echoed {echoed} messages")))
            }
        },
    );
    let (call, serving) = connect_local(handler, None, &config());
    let (mut tx, mut rx) = call.split();

    for expected in 0..3u32 {
        assert_eq!(rx.recv::<u32>().await.expect("produced"), Some(expected));
    }
    tx.send(&1u32).await.expect("send");
    tx.send(&2u32).await.expect("send");
    tx.close_send().await.expect("close");

    assert_eq!(rx.recv_all::<u32>().await.expect("echoes"), [101, 102]);
    assert!(serving.await.expect("session task").is_ok());
}

#[tokio::test(start_paused = true)]
async fn handler_may_stop_reading_early() {
    let handler = Handler::bidi_stream(
        |cx, mut inbound: Inbound<u32>, out: Outbound<u32>| async move {
            let first = inbound.recv().await?.unwrap_or_default();
            drop(inbound);
            // The remaining requests arrive after the drop and are discarded.
            cx.deadline().sleep(Duration::from_millis(50)).await?;
            out.send(&first).await
        },
    );
    let (mut call, serving) = connect_local(handler, None, &config());
    for n in 1..=5u32 {
        call.send(&n).await.expect("send");
    }
    call.close_send().await.expect("close");

    assert_eq!(call.recv_all::<u32>().await.expect("stream"), [1]);
    assert!(serving.await.expect("session task").is_ok());
}

#[tokio::test]
async fn sessions_run_in_parallel() {
    let service = CalculatorService::new();
    let calls = (0..32).map(|i| {
        let (call, _) = connect_local(service.sum(), None, &config());
        tokio::spawn(async move {
            call.unary::<_, SumResponse>(&SumRequest {
                values: vec![f64::from(i); 4],
            })
            .await
        })
    });

    for (i, call) in calls.collect::<Vec<_>>().into_iter().enumerate() {
        let res = call.await.expect("call task").expect("sum");
        assert_eq!(res.result, 4.0 * i as f64);
    }
}

/// Sending half that fails every frame once its data budget is spent.
struct FlakyTx {
    inner: MemoryTx,
    budget: AtomicUsize,
    tripped: AtomicBool,
    data_attempts: Arc<AtomicUsize>,
}

impl FrameTx for FlakyTx {
    async fn send(&self, frame: Frame) -> Result<(), ChannelError> {
        if matches!(frame, Frame::Data(_)) {
            self.data_attempts.fetch_add(1, Ordering::SeqCst);
            if self.budget.load(Ordering::SeqCst) == 0 {
                self.tripped.store(true, Ordering::SeqCst);
            } else {
                self.budget.fetch_sub(1, Ordering::SeqCst);
            }
        }
        if self.tripped.load(Ordering::SeqCst) {
            return Err(ChannelError::Reset("link dropped".into()));
        }
        self.inner.send(frame).await
    }

    async fn close(self) {
        self.inner.close().await;
    }
}

struct FlakyChannel {
    inner: MemoryChannel,
    budget: usize,
    data_attempts: Arc<AtomicUsize>,
}

impl MessageChannel for FlakyChannel {
    type Tx = FlakyTx;
    type Rx = MemoryRx;

    fn split(self) -> (FlakyTx, MemoryRx) {
        let (inner, rx) = self.inner.split();
        let tx = FlakyTx {
            inner,
            budget: AtomicUsize::new(self.budget),
            tripped: AtomicBool::new(false),
            data_attempts: self.data_attempts,
        };
        (tx, rx)
    }
}

#[tokio::test]
async fn send_failure_aborts_stream() {
    let (server_end, client_end) = memory_channel_pair(64);
    let data_attempts = Arc::new(AtomicUsize::new(0));
    let channel = FlakyChannel {
        inner: server_end,
        budget: 2,
        data_attempts: Arc::clone(&data_attempts),
    };

    let (client_tx, mut client_rx) = client_end.split();
    client_tx
        .send(Frame::Data(
            codec::encode(&PrimeNumberDecompositionRequest { number: 1 << 20 }).expect("encode"),
        ))
        .await
        .expect("request");
    client_tx.close_send().await.expect("close");

    let session = Session::open(Pattern::ServerStream, channel, DeadlineContext::unbounded());
    let status = session
        .serve(CalculatorService::new().prime_number_decomposition())
        .await;

    assert_eq!(status.code(), Code::Aborted);
    assert!(status.message().contains("link dropped"));
    // Two delivered, one failed, nothing after the failure.
    assert_eq!(data_attempts.load(Ordering::SeqCst), 3);
    for _ in 0..2 {
        assert!(matches!(
            client_rx.recv().await.expect("frame"),
            Some(Frame::Data(_))
        ));
    }
    drop(client_tx);
}
