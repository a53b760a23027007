// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! End-to-end tests against a minimal in-process server.
//!
//! The mock speaks just enough of the connection protocol and the services
//! to drive the client: Hello/Acknowledge, OpenSecureChannel, session
//! creation and activation, Read, Write, Browse, and the subscription
//! services. Variables live in a shared map keyed by their ns=2 string ids.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use uaforge_client::service::{
    decode_type_id, encode_message, ActivateSessionRequest, ActivateSessionResponse,
    ApplicationDescription, BrowseNextRequest, BrowseNextResponse, BrowseRequest, BrowseResponse,
    BrowseResult, ChannelSecurityToken,
    CloseSessionRequest, CloseSessionResponse, CreateMonitoredItemsRequest,
    CreateMonitoredItemsResponse, CreateSessionRequest, CreateSessionResponse,
    CreateSubscriptionRequest, CreateSubscriptionResponse, DataChangeNotification,
    DeleteMonitoredItemsRequest, DeleteMonitoredItemsResponse, DeleteSubscriptionsRequest,
    DeleteSubscriptionsResponse, EndpointDescription, MonitoredItemCreateResult,
    MonitoredItemNotification, NotificationMessage, OpenSecureChannelRequest,
    OpenSecureChannelResponse, PublishRequest, PublishResponse, ReadRequest, ReadResponse,
    ReferenceDescription, ResponseHeader, ServiceMessage, UserTokenPolicy, WriteRequest,
    WriteResponse,
};
use uaforge_client::{
    ClientConfig, ClientError, Quality, ServiceError, UaClient, VariableAccessor,
};
use uaforge_wire::framing::{
    Acknowledge, AsymmetricSecurityHeader, ChunkEnvelope, ChunkKind, Hello, MessageHeader,
    MessageType, SequenceHeader,
};
use uaforge_wire::{
    DataValue, Decode, Encode, Identifier, NodeId, StatusCode, Variant, MESSAGE_HEADER_SIZE,
};

// =====
// Mock server
// =====

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[derive(Default)]
struct ServerState {
    variables: HashMap<String, Variant>,
    /// Client handle to variable name, filled by CreateMonitoredItems.
    monitored: Vec<(u32, String)>,
    /// The first Publish delivers a notification; later ones are held open.
    published: bool,
    /// When set, Browse results carry a continuation point.
    truncate_browse: bool,
    /// Set once a BrowseNext with release arrives.
    browse_released: bool,
}

type SharedState = Arc<Mutex<ServerState>>;

fn state_with(variables: &[(&str, Variant)]) -> SharedState {
    let variables = variables
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect();
    Arc::new(Mutex::new(ServerState {
        variables,
        ..Default::default()
    }))
}

async fn spawn_server(state: SharedState) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            let state = Arc::clone(&state);
            tokio::spawn(serve_connection(stream, state));
        }
    });
    (addr, handle)
}

async fn read_frame(stream: &mut TcpStream) -> Option<(MessageHeader, Vec<u8>)> {
    let mut head = [0u8; MESSAGE_HEADER_SIZE];
    stream.read_exact(&mut head).await.ok()?;
    let header = MessageHeader::decode(&mut head.as_slice()).ok()?;
    let mut payload = vec![0u8; header.size as usize - MESSAGE_HEADER_SIZE];
    stream.read_exact(&mut payload).await.ok()?;
    Some((header, payload))
}

async fn write_frame(stream: &mut TcpStream, message_type: MessageType, body: &[u8]) {
    let mut frame = Vec::with_capacity(MESSAGE_HEADER_SIZE + body.len());
    MessageHeader::single(message_type, (MESSAGE_HEADER_SIZE + body.len()) as u32)
        .encode(&mut frame)
        .unwrap();
    frame.extend_from_slice(body);
    let _ = stream.write_all(&frame).await;
}

async fn serve_connection(mut stream: TcpStream, state: SharedState) {
    // Hello / Acknowledge.
    let Some((header, payload)) = read_frame(&mut stream).await else {
        return;
    };
    assert_eq!(header.message_type, MessageType::Hello);
    let hello = Hello::decode(&mut payload.as_slice()).unwrap();
    let ack = Acknowledge {
        protocol_version: 0,
        receive_buffer_size: hello.send_buffer_size,
        send_buffer_size: hello.receive_buffer_size,
        max_message_size: 0,
        max_chunk_count: 0,
    };
    write_frame(
        &mut stream,
        MessageType::Acknowledge,
        &ack.encode_to_vec().unwrap(),
    )
    .await;

    let mut sequence = 0u32;
    loop {
        let Some((header, payload)) = read_frame(&mut stream).await else {
            return;
        };
        match header.message_type {
            MessageType::OpenChannel => {
                let mut slice = payload.as_slice();
                let _channel_id = u32::decode(&mut slice).unwrap();
                let _security = AsymmetricSecurityHeader::decode(&mut slice).unwrap();
                let request_sequence = SequenceHeader::decode(&mut slice).unwrap();
                let _type_id = decode_type_id(&mut slice).unwrap();
                let request = OpenSecureChannelRequest::decode(&mut slice).unwrap();

                let response = OpenSecureChannelResponse {
                    header: ResponseHeader::good(request.header.request_handle),
                    server_protocol_version: 0,
                    token: ChannelSecurityToken {
                        channel_id: 1,
                        token_id: 1,
                        created_at: None,
                        revised_lifetime: request.requested_lifetime,
                    },
                    server_nonce: None,
                };
                sequence += 1;
                let mut body = Vec::new();
                1u32.encode(&mut body).unwrap(); // channel id
                AsymmetricSecurityHeader::none(
                    "http://opcfoundation.org/UA/SecurityPolicy#None",
                )
                .encode(&mut body)
                .unwrap();
                SequenceHeader {
                    sequence_number: sequence,
                    request_id: request_sequence.request_id,
                }
                .encode(&mut body)
                .unwrap();
                body.extend_from_slice(&encode_message(&response).unwrap());
                write_frame(&mut stream, MessageType::OpenChannel, &body).await;
            }
            MessageType::Message => {
                let envelope = ChunkEnvelope::parse(header, &payload).unwrap();
                let request_id = envelope.sequence.request_id;
                if let Some(response) = dispatch(&state, &envelope.body) {
                    sequence += 1;
                    let reply = ChunkEnvelope {
                        message_type: MessageType::Message,
                        chunk_kind: ChunkKind::Final,
                        channel_id: envelope.channel_id,
                        token_id: envelope.token_id,
                        sequence: SequenceHeader {
                            sequence_number: sequence,
                            request_id,
                        },
                        body: response,
                    };
                    let _ = stream.write_all(&reply.to_bytes().unwrap()).await;
                }
            }
            // CloseSecureChannel gets no response.
            MessageType::CloseChannel => {}
            other => panic!("unexpected message type {other:?}"),
        }
    }
}

fn type_number(node_id: &NodeId) -> u32 {
    match node_id.identifier {
        Identifier::Numeric(value) => value,
        _ => 0,
    }
}

fn variable_name(node_id: &NodeId) -> Option<&str> {
    match (&node_id.identifier, node_id.namespace) {
        (Identifier::String(name), 2) => Some(name.as_str()),
        _ => None,
    }
}

fn dispatch(state: &SharedState, mut body: &[u8]) -> Option<Vec<u8>> {
    let type_id = decode_type_id(&mut body).unwrap();
    let response = match type_number(&type_id) {
        CreateSessionRequest::TYPE_ID => {
            let request = CreateSessionRequest::decode(&mut body).unwrap();
            encode_message(&CreateSessionResponse {
                header: ResponseHeader::good(request.header.request_handle),
                session_id: NodeId::numeric(1, 1000),
                authentication_token: NodeId::numeric(1, 2000),
                revised_session_timeout: request.requested_session_timeout,
                server_nonce: Some(vec![0u8; 32]),
                server_certificate: None,
                server_endpoints: vec![EndpointDescription {
                    endpoint_url: request.endpoint_url,
                    server: ApplicationDescription::default(),
                    server_certificate: None,
                    security_mode: 1,
                    security_policy_uri: "http://opcfoundation.org/UA/SecurityPolicy#None"
                        .to_string(),
                    user_identity_tokens: vec![UserTokenPolicy {
                        policy_id: "anonymous".to_string(),
                        token_type: UserTokenPolicy::ANONYMOUS,
                        ..Default::default()
                    }],
                    transport_profile_uri: None,
                    security_level: 0,
                }],
                max_request_message_size: 0,
            })
        }
        ActivateSessionRequest::TYPE_ID => {
            let request = ActivateSessionRequest::decode(&mut body).unwrap();
            encode_message(&ActivateSessionResponse {
                header: ResponseHeader::good(request.header.request_handle),
                server_nonce: Some(vec![1u8; 32]),
            })
        }
        CloseSessionRequest::TYPE_ID => {
            let request = CloseSessionRequest::decode(&mut body).unwrap();
            encode_message(&CloseSessionResponse {
                header: ResponseHeader::good(request.header.request_handle),
            })
        }
        ReadRequest::TYPE_ID => {
            let request = ReadRequest::decode(&mut body).unwrap();
            let state = state.lock().unwrap();
            let results = request
                .nodes_to_read
                .iter()
                .map(|read| {
                    match variable_name(&read.node_id)
                        .and_then(|name| state.variables.get(name))
                    {
                        Some(value) => DataValue::new(value.clone()),
                        None => DataValue {
                            status: Some(StatusCode::BAD_NODE_ID_UNKNOWN),
                            ..Default::default()
                        },
                    }
                })
                .collect();
            encode_message(&ReadResponse {
                header: ResponseHeader::good(request.header.request_handle),
                results,
            })
        }
        WriteRequest::TYPE_ID => {
            let request = WriteRequest::decode(&mut body).unwrap();
            let mut state = state.lock().unwrap();
            let results = request
                .nodes_to_write
                .iter()
                .map(|write| match variable_name(&write.node_id) {
                    Some(name) => {
                        let value = write.value.value.clone().unwrap_or(Variant::Null);
                        state.variables.insert(name.to_string(), value);
                        StatusCode::GOOD
                    }
                    None => StatusCode::BAD_NODE_ID_UNKNOWN,
                })
                .collect();
            encode_message(&WriteResponse {
                header: ResponseHeader::good(request.header.request_handle),
                results,
            })
        }
        BrowseRequest::TYPE_ID => {
            let request = BrowseRequest::decode(&mut body).unwrap();
            let state = state.lock().unwrap();
            let results = request
                .nodes_to_browse
                .iter()
                .map(|browse| {
                    if browse.node_id == NodeId::OBJECTS_FOLDER {
                        BrowseResult {
                            status: StatusCode::GOOD,
                            continuation_point: state.truncate_browse.then(|| vec![0xCA]),
                            references: state
                                .variables
                                .keys()
                                .map(|name| ReferenceDescription {
                                    reference_type_id: NodeId::numeric(0, 47),
                                    is_forward: true,
                                    node_id: NodeId::string(2, name.clone()),
                                    browse_name: uaforge_wire::QualifiedName::new(
                                        2,
                                        name.clone(),
                                    ),
                                    display_name: uaforge_wire::LocalizedText::new(
                                        name.clone(),
                                    ),
                                    node_class: 2, // variable
                                    type_definition: NodeId::NULL,
                                })
                                .collect(),
                        }
                    } else {
                        BrowseResult {
                            status: StatusCode::BAD_NODE_ID_UNKNOWN,
                            continuation_point: None,
                            references: Vec::new(),
                        }
                    }
                })
                .collect();
            encode_message(&BrowseResponse {
                header: ResponseHeader::good(request.header.request_handle),
                results,
            })
        }
        BrowseNextRequest::TYPE_ID => {
            let request = BrowseNextRequest::decode(&mut body).unwrap();
            assert!(request.release_continuation_points);
            let mut state = state.lock().unwrap();
            state.browse_released = true;
            encode_message(&BrowseNextResponse {
                header: ResponseHeader::good(request.header.request_handle),
                results: request
                    .continuation_points
                    .iter()
                    .map(|_| BrowseResult {
                        status: StatusCode::GOOD,
                        continuation_point: None,
                        references: Vec::new(),
                    })
                    .collect(),
            })
        }
        CreateSubscriptionRequest::TYPE_ID => {
            let request = CreateSubscriptionRequest::decode(&mut body).unwrap();
            encode_message(&CreateSubscriptionResponse {
                header: ResponseHeader::good(request.header.request_handle),
                subscription_id: 1,
                revised_publishing_interval: request.requested_publishing_interval,
                revised_lifetime_count: request.requested_lifetime_count,
                revised_max_keep_alive_count: request.requested_max_keep_alive_count,
            })
        }
        CreateMonitoredItemsRequest::TYPE_ID => {
            let request = CreateMonitoredItemsRequest::decode(&mut body).unwrap();
            let mut state = state.lock().unwrap();
            let results = request
                .items_to_create
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    if let Some(name) = variable_name(&item.item_to_monitor.node_id) {
                        state
                            .monitored
                            .push((item.requested_parameters.client_handle, name.to_string()));
                    }
                    MonitoredItemCreateResult {
                        status: StatusCode::GOOD,
                        monitored_item_id: index as u32 + 1,
                        revised_sampling_interval: item.requested_parameters.sampling_interval,
                        revised_queue_size: item.requested_parameters.queue_size,
                    }
                })
                .collect();
            encode_message(&CreateMonitoredItemsResponse {
                header: ResponseHeader::good(request.header.request_handle),
                results,
            })
        }
        PublishRequest::TYPE_ID => {
            let request = PublishRequest::decode(&mut body).unwrap();
            let mut state = state.lock().unwrap();
            if state.published || state.monitored.is_empty() {
                // Held open: a real server parks Publish until data exists.
                return None;
            }
            state.published = true;
            let monitored_items = state
                .monitored
                .iter()
                .map(|(client_handle, name)| MonitoredItemNotification {
                    client_handle: *client_handle,
                    value: DataValue::new(
                        state.variables.get(name).cloned().unwrap_or(Variant::Null),
                    ),
                })
                .collect();
            let notification = DataChangeNotification { monitored_items };
            encode_message(&PublishResponse {
                header: ResponseHeader::good(request.header.request_handle),
                subscription_id: 1,
                available_sequence_numbers: vec![1],
                more_notifications: false,
                notification_message: NotificationMessage {
                    sequence_number: 1,
                    publish_time: None,
                    notification_data: vec![notification.to_extension_object().unwrap()],
                },
                results: request
                    .subscription_acknowledgements
                    .iter()
                    .map(|_| StatusCode::GOOD)
                    .collect(),
            })
        }
        DeleteMonitoredItemsRequest::TYPE_ID => {
            let request = DeleteMonitoredItemsRequest::decode(&mut body).unwrap();
            encode_message(&DeleteMonitoredItemsResponse {
                header: ResponseHeader::good(request.header.request_handle),
                results: request
                    .monitored_item_ids
                    .iter()
                    .map(|_| StatusCode::GOOD)
                    .collect(),
            })
        }
        DeleteSubscriptionsRequest::TYPE_ID => {
            let request = DeleteSubscriptionsRequest::decode(&mut body).unwrap();
            encode_message(&DeleteSubscriptionsResponse {
                header: ResponseHeader::good(request.header.request_handle),
                results: request
                    .subscription_ids
                    .iter()
                    .map(|_| StatusCode::GOOD)
                    .collect(),
            })
        }
        other => panic!("mock has no handler for type id {other}"),
    };
    Some(response.unwrap())
}

fn config_for(addr: SocketAddr) -> ClientConfig {
    ClientConfig::builder()
        .endpoint_url(format!("opc.tcp://{addr}"))
        .request_timeout(Duration::from_secs(5))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

// =====
// Client tests
// =====

#[tokio::test]
async fn test_connect_read_write_round_trip() {
    init_tracing();
    let state = state_with(&[("Machine.Speed", Variant::Double(21.5))]);
    let (addr, server) = spawn_server(state).await;

    let client = UaClient::connect(config_for(addr)).await.unwrap();
    assert!(client.is_connected().await);

    let node = NodeId::string(2, "Machine.Speed");
    let value = client.read_one(&node).await.unwrap();
    assert_eq!(value.value, Variant::Double(21.5));
    assert!(value.quality.is_good());

    client.write_one(&node, Variant::Double(30.0)).await.unwrap();
    let value = client.read_one(&node).await.unwrap();
    assert_eq!(value.value, Variant::Double(30.0));

    let stats = client.stats();
    assert_eq!(stats.reads, 2);
    assert_eq!(stats.writes, 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.success_rate(), 1.0);

    client.disconnect().await;
    assert!(!client.is_connected().await);
    server.abort();
}

#[tokio::test]
async fn test_unknown_node_maps_to_item_status() {
    init_tracing();
    let state = state_with(&[]);
    let (addr, server) = spawn_server(state).await;
    let client = UaClient::connect(config_for(addr)).await.unwrap();

    let node = NodeId::string(2, "NoSuchVariable");
    let err = client.read_one(&node).await.unwrap_err();
    match err {
        ClientError::Service(ServiceError::BadItemStatus { status, .. }) => {
            assert_eq!(status, StatusCode::BAD_NODE_ID_UNKNOWN);
        }
        other => panic!("expected bad item status, got {other}"),
    }

    // The plural read surfaces the status as quality instead.
    let values = client.read(std::slice::from_ref(&node)).await.unwrap();
    assert_eq!(
        values[0].quality,
        Quality::Bad(StatusCode::BAD_NODE_ID_UNKNOWN)
    );

    client.disconnect().await;
    server.abort();
}

#[tokio::test]
async fn test_browse_lists_variables() {
    init_tracing();
    let state = state_with(&[
        ("Machine.Speed", Variant::Double(21.5)),
        ("Machine.State", Variant::String("running".into())),
    ]);
    let (addr, server) = spawn_server(state).await;
    let client = UaClient::connect(config_for(addr)).await.unwrap();

    let references = client.browse(&NodeId::OBJECTS_FOLDER).await.unwrap();
    assert_eq!(references.len(), 2);
    let mut names: Vec<_> = references
        .iter()
        .map(|r| r.browse_name.to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["2:Machine.Speed", "2:Machine.State"]);

    let err = client
        .browse(&NodeId::string(2, "NotAFolder"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Service(ServiceError::BadItemStatus { .. })
    ));

    client.disconnect().await;
    server.abort();
}

#[tokio::test]
async fn test_browse_truncation_releases_continuation_point() {
    init_tracing();
    let state = state_with(&[("Machine.Speed", Variant::Double(21.5))]);
    state.lock().unwrap().truncate_browse = true;
    let (addr, server) = spawn_server(Arc::clone(&state)).await;
    let client = UaClient::connect(config_for(addr)).await.unwrap();

    // The truncated page is still returned and the leftover continuation
    // point is handed back to the server.
    let references = client.browse(&NodeId::OBJECTS_FOLDER).await.unwrap();
    assert_eq!(references.len(), 1);
    assert!(state.lock().unwrap().browse_released);

    client.disconnect().await;
    server.abort();
}

#[tokio::test]
async fn test_subscription_delivers_data_change() {
    init_tracing();
    let state = state_with(&[("Machine.Speed", Variant::Double(42.0))]);
    let (addr, server) = spawn_server(state).await;
    let client = UaClient::connect(config_for(addr)).await.unwrap();

    let node = NodeId::string(2, "Machine.Speed");
    let mut handle = client.subscribe(vec![node.clone()], None).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(10), handle.recv())
        .await
        .expect("no data change within deadline")
        .expect("subscription closed early");
    assert_eq!(event.subscription_id, handle.id());
    assert_eq!(event.node_id, node);
    assert_eq!(event.value.value, Variant::Double(42.0));
    assert_eq!(event.sequence_number, 1);

    client.unsubscribe(handle.id()).await.unwrap();
    client.disconnect().await;
    server.abort();
}

// =====
// Accessor facade tests
// =====

fn server_on_runtime(
    runtime: &tokio::runtime::Runtime,
    state: SharedState,
) -> (SocketAddr, JoinHandle<()>) {
    runtime.block_on(spawn_server(state))
}

#[test]
fn test_accessor_reads_parse_and_propagate() {
    init_tracing();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let state = state_with(&[
        ("Answer", Variant::String("42".into())),
        ("Label", Variant::String("abc".into())),
        ("Count", Variant::Int32(7)),
    ]);
    let (addr, server) = server_on_runtime(&runtime, state);

    let mut accessor = VariableAccessor::connect(&addr.ip().to_string(), addr.port()).unwrap();

    assert_eq!(accessor.read_as::<i32>("Answer").unwrap(), 42);
    // Numeric variants coerce through their rendered form too.
    assert_eq!(accessor.read_as::<i64>("Count").unwrap(), 7);

    let err = accessor.read_as::<i32>("Label").unwrap_err();
    assert!(matches!(err, ClientError::Conversion(_)));

    accessor.shutdown();
    server.abort();
}

#[test]
fn test_accessor_bool_truth_table() {
    init_tracing();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let state = state_with(&[
        ("A", Variant::String("true".into())),
        ("B", Variant::String("1".into())),
        ("C", Variant::String("TRUE".into())),
        ("D", Variant::String("0".into())),
        ("E", Variant::String("yes".into())),
        ("F", Variant::String(String::new())),
        ("G", Variant::Null),
    ]);
    let (addr, server) = server_on_runtime(&runtime, state);

    let mut accessor = VariableAccessor::connect(&addr.ip().to_string(), addr.port()).unwrap();
    assert!(accessor.read_bool("A").unwrap());
    assert!(accessor.read_bool("B").unwrap());
    assert!(accessor.read_bool("C").unwrap());
    assert!(!accessor.read_bool("D").unwrap());
    assert!(!accessor.read_bool("E").unwrap());
    assert!(!accessor.read_bool("F").unwrap());
    // Null renders as the empty string, which is false.
    assert!(!accessor.read_bool("G").unwrap());

    accessor.shutdown();
    server.abort();
}

#[test]
fn test_accessor_write_then_read_same_name() {
    init_tracing();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let state = state_with(&[("Target", Variant::Int32(0))]);
    let (addr, server) = server_on_runtime(&runtime, state);

    let mut accessor = VariableAccessor::connect(&addr.ip().to_string(), addr.port()).unwrap();
    accessor.write("Target", 5i32).unwrap();
    assert_eq!(accessor.read_as::<i32>("Target").unwrap(), 5);
    assert_eq!(accessor.read("Target").unwrap(), Variant::Int32(5));

    accessor.shutdown();
    server.abort();
}

#[test]
fn test_accessor_shutdown_survives_dead_connection() {
    init_tracing();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let state = state_with(&[("X", Variant::Int32(1))]);
    let (addr, server) = server_on_runtime(&runtime, state);

    let mut accessor = VariableAccessor::connect(&addr.ip().to_string(), addr.port()).unwrap();
    assert_eq!(accessor.read_as::<i32>("X").unwrap(), 1);

    // Kill the server out from under the accessor.
    server.abort();
    drop(runtime);

    accessor.shutdown();
    // A second shutdown is a no-op.
    accessor.shutdown();
}
