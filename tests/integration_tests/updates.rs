// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tests of the firmware-update task engine and its config document.

use super::setup;
use super::setup::RedfishTestContext;
use serde_json::json;
use serde_json::Value;
use std::time::Duration;
use std::time::Instant;

const CONFIG: &str = "/redfish/v1/UpdateService/FirmwareInventory/Config";
const BMC: &str = "/redfish/v1/UpdateService/FirmwareInventory/BMC";
const BIOS: &str = "/redfish/v1/UpdateService/FirmwareInventory/BIOS";
const RECOVERY: &str = "/redfish/v1/UpdateService/FirmwareInventory/Recovery";
const SIMPLE_UPDATE: &str = "/redfish/v1/UpdateService/SimpleUpdate";

async fn get_json(testctx: &RedfishTestContext, path: &str) -> Value {
    let resp = testctx.client.get(testctx.url(path)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

async fn patch_config_ok(testctx: &RedfishTestContext, body: Value) -> Value {
    let resp = testctx
        .client
        .patch(testctx.url(CONFIG))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

/// Polls a firmware target until its health reaches `want`, returning the
/// final document.
async fn wait_for_health(
    testctx: &RedfishTestContext,
    path: &str,
    want: &str,
) -> Value {
    for _ in 0..200 {
        let body = get_json(testctx, path).await;
        if body["Status"]["Health"] == json!(want) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("target at {} never reached health {}", path, want);
}

/// Polls a firmware target until its version reaches `want`, returning the
/// final document. (Health is OK both before and after a successful update,
/// so waiting on the version is what avoids racing the worker.)
async fn wait_for_version(
    testctx: &RedfishTestContext,
    path: &str,
    want: &str,
) -> Value {
    for _ in 0..200 {
        let body = get_json(testctx, path).await;
        if body["Version"] == json!(want) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("target at {} never reached version {}", path, want);
}

#[tokio::test]
async fn get_target_and_config_documents() {
    let testctx = setup::test_setup("get_target_and_config_documents").await;

    let body = get_json(&testctx, BMC).await;
    assert_eq!(body["Version"], json!("fw1.0.0"));
    assert_eq!(body["Updateable"], json!(true));
    assert_eq!(body["Status"]["Health"], json!("OK"));
    assert_eq!(body["Status"]["State"], json!("Enabled"));
    assert_eq!(body["Name"], json!("BMC Firmware"));

    let body = get_json(&testctx, CONFIG).await;
    assert_eq!(body["Id"], json!("UpdateServiceConfigInfo"));
    assert_eq!(
        body["CurrentValues"],
        json!({ "Fail": [], "Hang": 0, "UpdateTime": 30 })
    );
    // Every registered target is an allowable value for Fail.
    let fail_param = body["Parameters"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["Name"] == json!("Fail"))
        .unwrap();
    assert_eq!(
        fail_param["AllowableValues"],
        json!(["BMC", "BIOS", "Recovery"])
    );

    testctx.teardown().await;
}

#[tokio::test]
async fn config_patch_roundtrip() {
    let testctx = setup::test_setup("config_patch_roundtrip").await;

    let values = patch_config_ok(
        &testctx,
        json!({ "Fail": ["BMC"], "UpdateTime": 0 }),
    )
    .await;
    assert_eq!(
        values,
        json!({ "Fail": ["BMC"], "Hang": 0, "UpdateTime": 0 })
    );
    let body = get_json(&testctx, CONFIG).await;
    assert_eq!(body["CurrentValues"], values);

    // Only registered targets may be listed in Fail.
    let resp = testctx
        .client
        .patch(testctx.url(CONFIG))
        .json(&json!({ "Fail": ["NIC"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["Message"], json!("Invalid target for Fail, NIC"));

    let resp = testctx
        .client
        .patch(testctx.url(CONFIG))
        .json(&json!({ "UpdateTime": "soon" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["Message"],
        json!("Invalid value for UpdateTime, soon. Must be int.")
    );

    testctx.teardown().await;
}

#[tokio::test]
async fn simple_update_completes_and_bumps_version() {
    let testctx =
        setup::test_setup("simple_update_completes_and_bumps_version").await;
    patch_config_ok(&testctx, json!({ "UpdateTime": 0 })).await;

    let resp = testctx
        .client
        .post(testctx.url(SIMPLE_UPDATE))
        .json(&json!({
            "ImageURI": "fw2.0.0",
            "Targets": [BMC],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "code": 200, "message": "Request Succeeded" }));

    let body = wait_for_version(&testctx, BMC, "fw2.0.0").await;
    assert_eq!(body["Status"]["Health"], json!("OK"));

    testctx.teardown().await;
}

#[tokio::test]
async fn simple_update_defaults_to_bmc() {
    let testctx = setup::test_setup("simple_update_defaults_to_bmc").await;
    patch_config_ok(&testctx, json!({ "UpdateTime": 0 })).await;

    let resp = testctx
        .client
        .post(testctx.url(SIMPLE_UPDATE))
        .json(&json!({ "ImageURI": "fw2.0.0" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body = wait_for_version(&testctx, BMC, "fw2.0.0").await;
    assert_eq!(body["Status"]["Health"], json!("OK"));
    // Other targets are untouched.
    let body = get_json(&testctx, BIOS).await;
    assert_eq!(body["Version"], json!("bios-1.2.3"));

    testctx.teardown().await;
}

#[tokio::test]
async fn fail_listed_target_ends_in_error() {
    let testctx = setup::test_setup("fail_listed_target_ends_in_error").await;
    patch_config_ok(&testctx, json!({ "Fail": ["BIOS"], "UpdateTime": 0 }))
        .await;

    let resp = testctx
        .client
        .post(testctx.url(SIMPLE_UPDATE))
        .json(&json!({
            "ImageURI": "bios-2.0.0",
            "Targets": [BIOS],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body = wait_for_health(&testctx, BIOS, "ERROR").await;
    // A failed update leaves the version alone.
    assert_eq!(body["Version"], json!("bios-1.2.3"));

    testctx.teardown().await;
}

#[tokio::test]
async fn simple_update_rejects_bad_requests() {
    let testctx = setup::test_setup("simple_update_rejects_bad_requests").await;
    let client = &testctx.client;

    for (body, message) in [
        (json!({}), "ImageURI is required"),
        (
            json!({ "ImageURI": "fw2.0.0", "Targets": [RECOVERY] }),
            "Invalid target, Recovery. Not Updateable.",
        ),
        (
            json!({
                "ImageURI": "fw2.0.0",
                "Targets":
                    ["/redfish/v1/UpdateService/FirmwareInventory/NIC"],
            }),
            "Invalid target, NIC",
        ),
    ] {
        let resp = client
            .post(testctx.url(SIMPLE_UPDATE))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["Status"], json!(400));
        assert_eq!(body["Message"], json!(message));
    }

    testctx.teardown().await;
}

#[tokio::test]
async fn updating_target_rejects_second_update() {
    let testctx =
        setup::test_setup("updating_target_rejects_second_update").await;
    // Long enough that the first update is still in flight for the second
    // POST; teardown drains it.
    patch_config_ok(&testctx, json!({ "UpdateTime": 5 })).await;

    let resp = testctx
        .client
        .post(testctx.url(SIMPLE_UPDATE))
        .json(&json!({ "ImageURI": "fw2.0.0", "Targets": [BMC] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Health flips before the POST returns, not when the worker gets to it.
    let body = get_json(&testctx, BMC).await;
    assert_eq!(body["Status"]["Health"], json!("UPDATING"));

    let resp = testctx
        .client
        .post(testctx.url(SIMPLE_UPDATE))
        .json(&json!({ "ImageURI": "fw3.0.0", "Targets": [BMC] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["Message"],
        json!("Invalid target, BMC. Target is updating.")
    );

    testctx.teardown().await;
}

#[tokio::test]
async fn hang_delays_and_rejects_the_request() {
    let testctx =
        setup::test_setup("hang_delays_and_rejects_the_request").await;
    patch_config_ok(&testctx, json!({ "Hang": 1 })).await;

    let start = Instant::now();
    let resp = testctx
        .client
        .post(testctx.url(SIMPLE_UPDATE))
        .json(&json!({ "ImageURI": "fw2.0.0", "Targets": [BMC] }))
        .send()
        .await
        .unwrap();
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "Status": 500, "Message": "Hung" }));

    // Nothing was enqueued.
    let body = get_json(&testctx, BMC).await;
    assert_eq!(body["Status"]["Health"], json!("OK"));
    assert_eq!(body["Version"], json!("fw1.0.0"));

    testctx.teardown().await;
}

#[tokio::test]
async fn firmware_targets_are_read_only() {
    let testctx = setup::test_setup("firmware_targets_are_read_only").await;
    let client = &testctx.client;

    let resp = client
        .patch(testctx.url(BMC))
        .json(&json!({ "Version": "fw9.9.9" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 405);
    assert_eq!(resp.headers().get("allow").unwrap(), "GET");

    let resp = client
        .patch(testctx.url("/redfish/v1/UpdateService/FirmwareInventory/NIC"))
        .json(&json!({ "Version": "fw9.9.9" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    testctx.teardown().await;
}

#[tokio::test]
async fn simple_update_only_allows_post() {
    let testctx = setup::test_setup("simple_update_only_allows_post").await;

    let resp =
        testctx.client.get(testctx.url(SIMPLE_UPDATE)).send().await.unwrap();
    assert_eq!(resp.status(), 405);
    assert_eq!(resp.headers().get("allow").unwrap(), "POST");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"]["code"],
        json!("HttpStatus.1.0.MethodNotAllowed")
    );

    testctx.teardown().await;
}
