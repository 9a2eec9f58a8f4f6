use linksim::{
    driver::{Error, LinkDriver},
    ConfigError, LinkConfig, Packet, Side, SimTime, Trace,
};

fn config() -> LinkConfig {
    LinkConfig::from_options([("delay", "10ms"), ("bandwidth", "1Mbps")]).unwrap()
}

#[tokio::test]
async fn driven_link_delivers() {
    let _ = tracing_subscriber::fmt::try_init();

    let (handle, mut ports, _task) = LinkDriver::spawn(&config(), Trace::disabled()).unwrap();

    let delivery = handle.send(Side::A, Packet::zeroed(1, 1500)).await.unwrap();
    assert_eq!(delivery.deliver_at, SimTime::from_millis(22));

    handle.run_until(SimTime::from_millis(50)).await.unwrap();
    assert_eq!(handle.now().await.unwrap(), SimTime::from_millis(50));

    let received = ports.b.recv().await.unwrap();
    assert_eq!(received.packet.id(), 1);
    assert_eq!(received.at, SimTime::from_millis(22));

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.a.sent, 1);
    assert_eq!(stats.b.delivered, 1);
}

#[tokio::test]
async fn handles_share_one_link() {
    let _ = tracing_subscriber::fmt::try_init();

    let (handle, mut ports, _task) = LinkDriver::spawn(&config(), Trace::disabled()).unwrap();
    let other = handle.clone();

    let sender = tokio::spawn(async move {
        for id in 0..10 {
            other.send(Side::B, Packet::zeroed(id, 100)).await.unwrap();
        }
    });
    sender.await.unwrap();

    handle.run_until(SimTime::from_secs(1)).await.unwrap();
    for id in 0..10 {
        assert_eq!(ports.a.recv().await.unwrap().packet.id(), id);
    }

    let rate = handle.call(|ctx| ctx.link.capacity().last_rate()).await.unwrap();
    assert_eq!(rate.bps(), 1_000_000);
}

#[tokio::test]
async fn shutdown_closes_the_handle() {
    let _ = tracing_subscriber::fmt::try_init();

    let (handle, mut ports, task) = LinkDriver::spawn(&config(), Trace::disabled()).unwrap();
    handle.send(Side::A, Packet::zeroed(1, 1500)).await.unwrap();

    handle.shutdown();
    task.await.unwrap();

    assert!(handle.is_closed());
    assert!(matches!(handle.now().await, Err(Error::Closed)));

    // The pending delivery was cancelled and the link's senders are gone.
    assert!(ports.b.recv().await.is_none());
}

#[tokio::test]
async fn invalid_config_fails_to_spawn() {
    let config = LinkConfig::default().with_drop(linksim::DropConfig::default().with_max_burst(0));
    let err = LinkDriver::spawn(&config, Trace::disabled()).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::OutOfRange { option: "max_burst", .. })));
}
