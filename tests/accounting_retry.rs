//! A `Client` sending an Accounting-Request against a silent port: no
//! reply ever arrives, so the client must retry with an escalating
//! `Acct-Delay-Time` and eventually give up with a `TimeoutError`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use radius_core::host::Ports;
use radius_core::packet::{AttrValue, PacketCode};
use radius_core::{Client, Dictionary, Packet, RadiusError};

#[tokio::test]
async fn accounting_request_retries_with_growing_acct_delay_time_then_times_out() {
    let secret = b"silent-secret".to_vec();
    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let ports = Ports {
        auth: 18221,
        acct: 18231,
        coa: 38991,
    };

    // A listener that receives every datagram but never answers one,
    // standing in for a RADIUS accounting server that's down.
    let silent_socket = tokio::net::UdpSocket::bind(SocketAddr::new(loopback, ports.acct))
        .await
        .expect("bind silent listener");
    let observed_delays = Arc::new(Mutex::new(Vec::new()));
    let listener_task = {
        let observed_delays = observed_delays.clone();
        let dict = Dictionary::standard();
        let secret = secret.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let Ok((n, _from)) = silent_socket.recv_from(&mut buf).await else {
                    break;
                };
                let Ok(packet) = Packet::decode(&buf[..n], &dict, secret.clone()) else {
                    continue;
                };
                let delay = match packet.get(&dict, "Acct-Delay-Time") {
                    Ok(values) => match values.into_iter().next() {
                        Some(AttrValue::Int(v)) => v,
                        _ => 0,
                    },
                    Err(_) => 0,
                };
                observed_delays.lock().unwrap().push(delay);
            }
        })
    };

    let client = Client::new(loopback, secret, Dictionary::standard())
        .await
        .expect("client bind")
        .with_ports(ports)
        .with_timeout(Duration::from_secs(1))
        .with_retries(2);

    let dict = Dictionary::standard();
    let mut request = Packet::new(PacketCode::AccountingRequest, b"silent-secret".to_vec());
    request
        .set(&dict, "Acct-Status-Type", AttrValue::Int(1))
        .unwrap();

    let result = client.send(&mut request).await;
    listener_task.abort();

    match result {
        Err(RadiusError::Timeout(e)) => assert_eq!(e.attempts, 3),
        other => panic!("expected a TimeoutError after exhausting retries, got {other:?}"),
    }

    // First attempt carries no delay bump; each retry adds one more
    // timeout's worth of seconds on top of the last observed value.
    let delays = observed_delays.lock().unwrap().clone();
    assert_eq!(delays, vec![0, 1, 2]);
}
