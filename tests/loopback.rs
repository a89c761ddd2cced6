//! End-to-end exchange over UDP loopback: a `Client` sends an
//! Access-Request to an in-process `Server`, which replies with an
//! Access-Accept built from the request's id and authenticator.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use radius_core::host::Ports;
use radius_core::packet::{AttrValue, PacketCode};
use radius_core::server::{Outbound, PortSocket, RemoteHost, Server};
use radius_core::{Client, Dictionary, Packet};

#[tokio::test]
async fn access_request_round_trips_through_a_loopback_server() {
    let secret = b"loopback-secret".to_vec();
    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let ports = Ports {
        auth: 18121,
        acct: 18131,
        coa: 37991,
    };

    let mut server = Server::new(
        Dictionary::standard(),
        vec![RemoteHost::new(loopback, secret.clone(), "test-nas")],
    )
    .with_ports(ports);
    server.bind(loopback).await.expect("server bind");
    let server = Arc::new(server);

    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    let run_task = {
        let server = server.clone();
        tokio::spawn(async move {
            let _ = server.run(tx).await;
        })
    };

    let handler_task = {
        let server = server.clone();
        tokio::spawn(async move {
            let inbound = rx.recv().await.expect("request delivered to handler");
            assert_eq!(inbound.host_name, "test-nas");
            let dict = Dictionary::standard();
            let mut reply = inbound.packet.reply(PacketCode::AccessAccept);
            reply
                .set(&dict, "Reply-Message", AttrValue::Text("welcome".into()))
                .unwrap();
            server
                .reply(Outbound {
                    packet: reply,
                    destination: inbound.source,
                    port: PortSocket::Auth,
                })
                .await
                .expect("reply send");
        })
    };

    let client = Client::new(loopback, secret, Dictionary::standard())
        .await
        .expect("client bind")
        .with_ports(ports)
        .with_timeout(std::time::Duration::from_secs(2))
        .with_retries(1);

    let dict = Dictionary::standard();
    let mut request = Packet::new(PacketCode::AccessRequest, b"loopback-secret".to_vec());
    request.set(&dict, "User-Name", AttrValue::Text("alice".into())).unwrap();
    request
        .set(&dict, "User-Password", AttrValue::Text("hunter2".into()))
        .unwrap();

    let reply = client.send(&mut request).await.expect("verified reply within timeout");
    assert_eq!(reply.code, PacketCode::AccessAccept);
    let messages = reply.get(&dict, "Reply-Message").unwrap();
    assert_eq!(messages, vec![AttrValue::Text("welcome".into())]);

    handler_task.await.expect("handler task");
    run_task.abort();
}
