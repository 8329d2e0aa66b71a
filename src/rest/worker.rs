// This file is part of TRINCI.
//
// Copyright (C) 2021 Affidaty Spa.
//
// TRINCI is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the
// Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// TRINCI is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License
// for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with TRINCI. If not, see <https://www.gnu.org/licenses/>.

use super::RestConfig;
use crate::{
    base::{
        serialize::{json_deserialize, json_serialize},
        Header, TransactionGroup,
    },
    error::{AdmitError, RollbackError, ValidationError},
    softblocks::{AbandonedBlock, Message, SoftBlockRequestSender},
    Error, ErrorKind, Result, VERSION,
};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tide::{http::mime, Request, Response, StatusCode};

/// Handlers shared state.
#[derive(Clone)]
struct RestState {
    /// Soft blocks service requests channel.
    chan: SoftBlockRequestSender,
    /// Max wait for a service response.
    timeout: Duration,
}

/// Conversion from "core" errors to HTTP errors.
impl From<ErrorKind> for StatusCode {
    fn from(err: ErrorKind) -> StatusCode {
        use crate::error::ErrorKind::*;
        match err {
            MalformedData => StatusCode::BadRequest,
            InvalidSignature => StatusCode::Unauthorized,
            ResourceNotFound => StatusCode::NotFound,
            ServiceUnavailable => StatusCode::ServiceUnavailable,
            EngineFault | Other => StatusCode::InternalServerError,
        }
    }
}

impl From<&ValidationError> for StatusCode {
    fn from(err: &ValidationError) -> StatusCode {
        use crate::error::ValidationError::*;
        match err {
            BadSignature => StatusCode::Unauthorized,
            InvalidTransaction { .. } | ParamsMismatch { .. } => StatusCode::BadRequest,
            EpochClosed
            | UnexpectedBlockId { .. }
            | BlockNotClosed { .. }
            | OutOfOrderGroup { .. }
            | DuplicateTransaction { .. } => StatusCode::Conflict,
        }
    }
}

impl From<&AdmitError> for StatusCode {
    fn from(err: &AdmitError) -> StatusCode {
        match err {
            AdmitError::Validation(err) => err.into(),
            AdmitError::BuildFailed(_) => StatusCode::InternalServerError,
        }
    }
}

impl From<&RollbackError> for StatusCode {
    fn from(err: &RollbackError) -> StatusCode {
        match err {
            RollbackError::CannotRemoveFinalized { .. } => StatusCode::Conflict,
            RollbackError::EngineFailure(_) => StatusCode::InternalServerError,
        }
    }
}

fn kind_code(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::MalformedData => "MalformedData",
        ErrorKind::InvalidSignature => "InvalidSignature",
        ErrorKind::EngineFault => "EngineFault",
        ErrorKind::ResourceNotFound => "ResourceNotFound",
        ErrorKind::ServiceUnavailable => "ServiceUnavailable",
        ErrorKind::Other => "Other",
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    /// Rejected group position, batches only.
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
    /// Blocks built before the rejection, batches only.
    #[serde(skip_serializing_if = "Option::is_none")]
    preconf_headers: Option<Vec<Header>>,
}

impl<'a> ErrorBody<'a> {
    fn new(error: &'a str, message: String) -> Self {
        ErrorBody {
            error,
            message,
            index: None,
            preconf_headers: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildSoftBlockRequestBody {
    transaction_batch: TransactionGroup,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildSoftBlockResponseBody {
    /// `None` while the block is still accumulating groups.
    block_header: Option<Header>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveSoftBlocksRequestBody {
    new_head: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetPreconfHeadResponseBody {
    current_head: Header,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBlocksByGroupsRequestBody {
    transactions_groups: Vec<TransactionGroup>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBlocksByGroupsResponseBody {
    preconf_headers: Vec<Header>,
}

#[derive(Serialize)]
struct AbandonResponseBody {
    abandoned: Option<AbandonedBlock>,
}

#[derive(Serialize)]
struct ReopenResponseBody {
    reopened: bool,
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> tide::Result {
    let body = json_serialize(value)?;
    let response = Response::builder(status)
        .body(body)
        .content_type(mime::JSON)
        .build();
    Ok(response)
}

fn core_error(err: Error) -> tide::Result {
    let body = ErrorBody::new(kind_code(err.kind), err.to_string_full());
    json_response(err.kind.into(), &body)
}

fn admit_error(err: &AdmitError) -> tide::Result {
    json_response(err.into(), &ErrorBody::new(err.code(), err.to_string()))
}

fn rollback_error(err: &RollbackError) -> tide::Result {
    json_response(err.into(), &ErrorBody::new(err.code(), err.to_string()))
}

fn unexpected(res: Message) -> tide::Result {
    debug!("unexpected response from soft blocks service: {:?}", res);
    match res {
        Message::Exception(err) => core_error(err),
        _ => core_error(Error::new_ext(
            ErrorKind::Other,
            "unexpected response from soft blocks service",
        )),
    }
}

async fn read_json<T: DeserializeOwned>(req: &mut Request<RestState>) -> Result<T> {
    let body = req
        .body_bytes()
        .await
        .map_err(|err| Error::new_ext(ErrorKind::MalformedData, err.to_string()))?;
    json_deserialize(&body)
}

// Every message that we are sending is a CONFIRMED message (i.e. a response
// is expected). A missing reply is turned into `ServiceUnavailable` after
// the configured timeout.
async fn send_recv(state: &RestState, request: Message) -> Result<Message> {
    let receiver = state.chan.send(request).await.map_err(|_err| {
        Error::new_ext(ErrorKind::ServiceUnavailable, "soft blocks service seems down")
    })?;

    receiver
        .recv_timeout(state.timeout)
        .await
        .map_err(|err| Error::new_ext(ErrorKind::ServiceUnavailable, err))
}

async fn post_soft_blocks(mut req: Request<RestState>) -> tide::Result {
    let body: BuildSoftBlockRequestBody = match read_json(&mut req).await {
        Ok(body) => body,
        Err(err) => return core_error(err),
    };
    let msg = Message::AdmitGroupRequest {
        group: body.transaction_batch,
    };
    match send_recv(req.state(), msg).await {
        Ok(Message::AdmitGroupResponse { header }) => json_response(
            StatusCode::Ok,
            &BuildSoftBlockResponseBody {
                block_header: header,
            },
        ),
        Ok(Message::AdmitRejected { error }) => admit_error(&error),
        Ok(res) => unexpected(res),
        Err(err) => core_error(err),
    }
}

async fn remove_above(req: &mut Request<RestState>) -> std::result::Result<Message, tide::Result> {
    let body: RemoveSoftBlocksRequestBody = read_json(req).await.map_err(core_error)?;
    let msg = Message::RemoveAboveRequest {
        height: body.new_head,
    };
    send_recv(req.state(), msg).await.map_err(core_error)
}

async fn delete_soft_blocks(mut req: Request<RestState>) -> tide::Result {
    match remove_above(&mut req).await {
        Ok(Message::RemoveAboveResponse { summary }) => json_response(StatusCode::Ok, &summary),
        Ok(Message::RollbackRejected { error }) => rollback_error(&error),
        Ok(res) => unexpected(res),
        Err(res) => res,
    }
}

async fn put_preconf_head(mut req: Request<RestState>) -> tide::Result {
    match remove_above(&mut req).await {
        Ok(Message::RemoveAboveResponse { summary }) => json_response(
            StatusCode::Ok,
            &ResetPreconfHeadResponseBody {
                current_head: summary.current_head,
            },
        ),
        Ok(Message::RollbackRejected { error }) => rollback_error(&error),
        Ok(res) => unexpected(res),
        Err(res) => res,
    }
}

async fn post_preconf_blocks(mut req: Request<RestState>) -> tide::Result {
    let body: CreateBlocksByGroupsRequestBody = match read_json(&mut req).await {
        Ok(body) => body,
        Err(err) => return core_error(err),
    };
    let msg = Message::AdmitBatchRequest {
        groups: body.transactions_groups,
    };
    let outcome = match send_recv(req.state(), msg).await {
        Ok(Message::AdmitBatchResponse { outcome }) => outcome,
        Ok(res) => return unexpected(res),
        Err(err) => return core_error(err),
    };
    match outcome.rejected {
        None => json_response(
            StatusCode::Ok,
            &CreateBlocksByGroupsResponseBody {
                preconf_headers: outcome.headers,
            },
        ),
        Some(rejection) => {
            let body = ErrorBody {
                index: Some(rejection.index),
                preconf_headers: Some(outcome.headers),
                ..ErrorBody::new(rejection.error.code(), rejection.error.to_string())
            };
            json_response((&rejection.error).into(), &body)
        }
    }
}

async fn delete_open_block(req: Request<RestState>) -> tide::Result {
    match send_recv(req.state(), Message::AbandonOpenBlockRequest).await {
        Ok(Message::AbandonOpenBlockResponse { abandoned }) => {
            json_response(StatusCode::Ok, &AbandonResponseBody { abandoned })
        }
        Ok(res) => unexpected(res),
        Err(err) => core_error(err),
    }
}

async fn put_preconf_epoch(req: Request<RestState>) -> tide::Result {
    match send_recv(req.state(), Message::ReopenEpochRequest).await {
        Ok(Message::ReopenEpochResponse { reopened }) => {
            json_response(StatusCode::Ok, &ReopenResponseBody { reopened })
        }
        Ok(res) => unexpected(res),
        Err(err) => core_error(err),
    }
}

async fn get_status(req: Request<RestState>) -> tide::Result {
    match send_recv(req.state(), Message::GetStatusRequest).await {
        Ok(Message::GetStatusResponse { status }) => json_response(StatusCode::Ok, &status),
        Ok(res) => unexpected(res),
        Err(err) => core_error(err),
    }
}

async fn health_check(_req: Request<RestState>) -> tide::Result {
    Ok(Response::new(StatusCode::Ok))
}

async fn get_index(_req: Request<RestState>) -> tide::Result {
    Ok(format!("TRINCI Soft Blocks v{}", VERSION).into())
}

pub fn run(config: RestConfig, chan: SoftBlockRequestSender) {
    let state = RestState {
        chan,
        timeout: config.timeout,
    };
    let mut app = tide::with_state(state);

    app.at("/softBlocks")
        .post(post_soft_blocks)
        .delete(delete_soft_blocks);
    app.at("/softBlocks/open").delete(delete_open_block);
    app.at("/preconfBlocks").post(post_preconf_blocks);
    app.at("/preconfHead").put(put_preconf_head);
    app.at("/preconfEpoch").put(put_preconf_epoch);
    app.at("/status").get(get_status);
    app.at("/healthz").get(health_check);
    app.at("/").get(get_index);

    let fut = app.listen((config.addr, config.port));
    if let Err(err) = async_std::task::block_on(fut) {
        error!("REST server fault: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        base::{schema::tests::create_test_group, GroupMarker},
        channel,
        crypto::sign::tests::create_test_schedule,
        engine::tests::TestEngine,
        softblocks::{SoftBlockConfig, SoftBlockRequestReceiver, SoftBlockService},
    };
    use serde_json::{json, Value};
    use std::{
        sync::atomic::{AtomicU16, Ordering},
        thread,
    };

    const TIMEOUT: Duration = Duration::from_secs(3);

    fn next_port() -> u16 {
        static PORT: AtomicU16 = AtomicU16::new(9200);
        PORT.fetch_add(1, Ordering::SeqCst)
    }

    fn wait_listener(addr: &str) {
        let mut trials = 3;
        loop {
            match ureq::get(addr).call() {
                Ok(_) => break,
                Err(_) if trials > 0 => {
                    trials -= 1;
                    std::thread::sleep(std::time::Duration::from_secs(1));
                }
                _ => panic!("connection refused"),
            }
        }
    }

    fn start_rest(chan: SoftBlockRequestSender) -> String {
        let port = next_port();
        let addr = format!("http://localhost:{}", port);
        let config = RestConfig {
            addr: "localhost".to_owned(),
            port,
            timeout: TIMEOUT,
        };
        thread::spawn(move || run(config, chan));
        wait_listener(&addr);
        addr
    }

    /// REST listener in front of a soft blocks service on top of block 4.
    fn start_listener() -> (String, SoftBlockService<TestEngine, crate::crypto::FixedSequencer>) {
        let mut svc = SoftBlockService::new(
            SoftBlockConfig::default(),
            TestEngine::with_head(4),
            create_test_schedule(),
        )
        .unwrap();
        svc.start();
        let addr = start_rest(svc.request_channel());
        (addr, svc)
    }

    /// Soft blocks service that never answers.
    fn start_broken_listener() -> String {
        let (tx_chan, rx_chan): (SoftBlockRequestSender, SoftBlockRequestReceiver) =
            channel::confirmed_channel();
        thread::spawn(move || {
            while let Ok((_req, res_chan)) = rx_chan.recv_sync() {
                drop(res_chan);
            }
        });
        start_rest(tx_chan)
    }

    fn into_json(response: ureq::Response) -> Value {
        serde_json::from_str(&response.into_string().unwrap()).unwrap()
    }

    fn send(method: &str, url: &str, body: Value) -> (u16, Value) {
        let res = ureq::request(method, url)
            .set("Content-Type", "application/json")
            .send_string(&body.to_string());
        match res {
            Ok(response) => (response.status(), into_json(response)),
            Err(ureq::Error::Status(code, response)) => (code, into_json(response)),
            Err(err) => panic!("Unexpected result: {:?}", err),
        }
    }

    fn post_group(addr: &str, block_id: u64, group_id: u64, marker: GroupMarker) -> (u16, Value) {
        let body = json!({ "transactionBatch": create_test_group(block_id, group_id, marker) });
        send("POST", &format!("{}/softBlocks", addr), body)
    }

    #[test]
    fn index_test() {
        let (addr, _svc) = start_listener();

        let response = ureq::get(&addr).call().unwrap();

        assert_eq!(
            response.into_string().unwrap(),
            format!("TRINCI Soft Blocks v{}", VERSION)
        );
    }

    #[test]
    fn health_check_test() {
        let addr = start_broken_listener();

        let response = ureq::get(&format!("{}/healthz", addr)).call().unwrap();

        assert_eq!(response.status(), 200);
    }

    #[test]
    fn soft_block_groups() {
        let (addr, _svc) = start_listener();

        let (status, first) = post_group(&addr, 5, 1, GroupMarker::None);
        let (_, last) = post_group(&addr, 5, 2, GroupMarker::EndOfBlock);

        assert_eq!(status, 200);
        assert_eq!(first, json!({ "blockHeader": null }));
        assert_eq!(last["blockHeader"]["number"], 5);
    }

    #[test]
    fn out_of_order_group_conflict() {
        let (addr, _svc) = start_listener();

        let (status, body) = post_group(&addr, 5, 2, GroupMarker::None);

        assert_eq!(status, 409);
        assert_eq!(body["error"], "OutOfOrderGroup");
        assert_eq!(body["message"], "out of order group 2, expected 1");
    }

    #[test]
    fn unsigned_group_unauthorized() {
        let (addr, _svc) = start_listener();
        let mut group = create_test_group(5, 1, GroupMarker::None);
        group.signature.clear();

        let (status, body) = send(
            "POST",
            &format!("{}/softBlocks", addr),
            json!({ "transactionBatch": group }),
        );

        assert_eq!(status, 401);
        assert_eq!(body["error"], "BadSignature");
    }

    #[test]
    fn malformed_body() {
        let (addr, _svc) = start_listener();

        let (status, body) = send(
            "POST",
            &format!("{}/softBlocks", addr),
            json!({ "transactionBatch": { "blockId": "five" } }),
        );

        assert_eq!(status, 400);
        assert_eq!(body["error"], "MalformedData");
    }

    #[test]
    fn build_failure_is_server_error() {
        let (addr, svc) = start_listener();
        svc.chain_arc().lock().engine.fail_build = true;

        let (status, body) = post_group(&addr, 5, 1, GroupMarker::EndOfBlock);

        assert_eq!(status, 500);
        assert_eq!(body["error"], "BuildFailed");
    }

    #[test]
    fn remove_soft_blocks() {
        let (addr, _svc) = start_listener();
        post_group(&addr, 5, 1, GroupMarker::EndOfBlock);
        post_group(&addr, 6, 1, GroupMarker::EndOfBlock);

        let (status, body) = send(
            "DELETE",
            &format!("{}/softBlocks", addr),
            json!({ "newHead": 4 }),
        );

        assert_eq!(status, 200);
        assert_eq!(body["headRemoved"], 2);
        assert_eq!(body["currentHead"]["number"], 4);
    }

    #[test]
    fn remove_finalized_conflict() {
        let (addr, svc) = start_listener();
        post_group(&addr, 5, 1, GroupMarker::EndOfBlock);
        svc.chain_arc().lock().engine.finalized = 5;

        let (status, body) = send(
            "DELETE",
            &format!("{}/softBlocks", addr),
            json!({ "newHead": 4 }),
        );

        assert_eq!(status, 409);
        assert_eq!(body["error"], "CannotRemoveFinalized");
    }

    #[test]
    fn reset_preconf_head() {
        let (addr, _svc) = start_listener();
        post_group(&addr, 5, 1, GroupMarker::EndOfBlock);

        let (status, body) = send(
            "PUT",
            &format!("{}/preconfHead", addr),
            json!({ "newHead": 4 }),
        );

        assert_eq!(status, 200);
        assert_eq!(body["currentHead"]["number"], 4);
    }

    #[test]
    fn preconf_blocks_batch() {
        let (addr, _svc) = start_listener();
        let groups = vec![
            create_test_group(5, 1, GroupMarker::None),
            create_test_group(5, 2, GroupMarker::EndOfBlock),
            create_test_group(6, 1, GroupMarker::EndOfPreconf),
        ];

        let (status, body) = send(
            "POST",
            &format!("{}/preconfBlocks", addr),
            json!({ "transactionsGroups": groups }),
        );

        assert_eq!(status, 200);
        assert_eq!(body["preconfHeaders"].as_array().unwrap().len(), 2);
        assert_eq!(body["preconfHeaders"][1]["number"], 6);
    }

    #[test]
    fn preconf_blocks_partial_batch() {
        let (addr, _svc) = start_listener();
        let groups = vec![
            create_test_group(5, 1, GroupMarker::EndOfPreconf),
            create_test_group(6, 1, GroupMarker::None),
        ];

        let (status, body) = send(
            "POST",
            &format!("{}/preconfBlocks", addr),
            json!({ "transactionsGroups": groups }),
        );

        assert_eq!(status, 409);
        assert_eq!(body["error"], "EpochClosed");
        assert_eq!(body["index"], 1);
        assert_eq!(body["preconfHeaders"][0]["number"], 5);
    }

    #[test]
    fn abandon_and_reopen() {
        let (addr, _svc) = start_listener();
        post_group(&addr, 5, 1, GroupMarker::None);

        let (_, abandoned) = send("DELETE", &format!("{}/softBlocks/open", addr), json!({}));
        let (_, reopened) = send("PUT", &format!("{}/preconfEpoch", addr), json!({}));

        assert_eq!(
            abandoned,
            json!({ "abandoned": { "blockId": 5, "groups": 1, "transactions": 2 } })
        );
        assert_eq!(reopened, json!({ "reopened": false }));
    }

    #[test]
    fn status_test() {
        let (addr, _svc) = start_listener();
        post_group(&addr, 5, 1, GroupMarker::None);

        let response = ureq::get(&format!("{}/status", addr)).call().unwrap();
        let body = into_json(response);

        assert_eq!(body["openBlockId"], 5);
        assert_eq!(body["expectedNextGroupId"], 2);
        assert_eq!(body["lastSoftBlockHeight"], 4);
        assert_eq!(body["preconfEpochOpen"], true);
    }

    #[test]
    fn service_down() {
        let addr = start_broken_listener();

        let (status, body) = send(
            "DELETE",
            &format!("{}/softBlocks", addr),
            json!({ "newHead": 4 }),
        );

        assert_eq!(status, 503);
        assert_eq!(body["error"], "ServiceUnavailable");
    }
}
