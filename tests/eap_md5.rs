//! `Client::authenticate_eap_md5` against a fake Access-Challenge
//! responder: the EAP-Response/Identity's embedded EAP id must equal the
//! id of the RADIUS packet that carries it, and the two-flight exchange
//! must end in an Access-Accept.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use md5::{Digest, Md5};

use radius_core::host::Ports;
use radius_core::packet::{Key, PacketCode};
use radius_core::server::{Outbound, PortSocket, RemoteHost, Server};
use radius_core::{Client, Dictionary};

const EAP_CODE_REQUEST: u8 = 1;
const EAP_TYPE_MD5_CHALLENGE: u8 = 4;

#[tokio::test]
async fn eap_md5_response_identity_id_matches_enclosing_packet_id() {
    let secret = b"eap-secret".to_vec();
    let password = b"hunter2";
    let challenge_value = [0x11u8; 16];
    let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let ports = Ports {
        auth: 18321,
        acct: 18331,
        coa: 39991,
    };

    let mut server = Server::new(
        Dictionary::standard(),
        vec![RemoteHost::new(loopback, secret.clone(), "fake-nas")],
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
            // First flight: the EAP-Response/Identity.
            let identity = rx.recv().await.expect("identity request delivered");
            let packet_id = identity.packet.id.expect("client assigns an id before sending");
            let eap = identity
                .packet
                .raw_get(Key::Standard(79))
                .and_then(|values| values.first())
                .expect("EAP-Message attribute present")
                .clone();
            let eap_id = eap[1];
            assert_eq!(
                eap_id, packet_id,
                "EAP-Response/Identity id must match the enclosing RADIUS packet id"
            );

            let mut md5_challenge = vec![EAP_CODE_REQUEST, eap_id];
            let len = (6 + challenge_value.len()) as u16;
            md5_challenge.extend_from_slice(&len.to_be_bytes());
            md5_challenge.push(EAP_TYPE_MD5_CHALLENGE);
            md5_challenge.push(challenge_value.len() as u8);
            md5_challenge.extend_from_slice(&challenge_value);

            let mut challenge_reply = identity.packet.reply(PacketCode::AccessChallenge);
            challenge_reply.raw_set(Key::Standard(79), vec![md5_challenge]);
            challenge_reply.raw_set(Key::Standard(24), vec![b"eap-state-token".to_vec()]);
            server
                .reply(Outbound {
                    packet: challenge_reply,
                    destination: identity.source,
                    port: PortSocket::Auth,
                })
                .await
                .expect("challenge reply send");

            // Second flight: the EAP-Response/MD5-Challenge.
            let response = rx.recv().await.expect("eap-md5 response delivered");
            let eap = response
                .packet
                .raw_get(Key::Standard(79))
                .and_then(|values| values.first())
                .expect("EAP-Message attribute present");
            let response_id = eap[1];
            assert_eq!(response_id, eap_id, "EAP id must carry over from the challenge");

            let mut hasher = Md5::new();
            hasher.update([eap_id]);
            hasher.update(password);
            hasher.update(challenge_value);
            let expected_hash = hasher.finalize();
            let value_size = eap[5] as usize;
            assert_eq!(&eap[6..6 + value_size], &expected_hash[..]);

            let accept = response.packet.reply(PacketCode::AccessAccept);
            server
                .reply(Outbound {
                    packet: accept,
                    destination: response.source,
                    port: PortSocket::Auth,
                })
                .await
                .expect("accept reply send");
        })
    };

    let client = Client::new(loopback, secret, Dictionary::standard())
        .await
        .expect("client bind")
        .with_ports(ports)
        .with_timeout(std::time::Duration::from_secs(2))
        .with_retries(1);

    let reply = client
        .authenticate_eap_md5("alice", password)
        .await
        .expect("eap-md5 exchange completes");
    assert_eq!(reply.code, PacketCode::AccessAccept);

    handler_task.await.expect("handler task");
    run_task.abort();
}
