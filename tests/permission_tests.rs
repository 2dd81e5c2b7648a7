// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the native permissions provider

use media_capture::native::virtual_device::{DeliveryMode, VirtualBoundary};
use media_capture::{Config, MediaContext, PermissionKind, PermissionStatus, Permissions};
use std::sync::Arc;
use std::time::Duration;

fn native(boundary: VirtualBoundary) -> Permissions {
    Permissions::Native(Arc::new(boundary))
}

#[tokio::test]
async fn test_native_check_reports_current_status() {
    let permissions = native(
        VirtualBoundary::new()
            .with_permission(PermissionKind::Camera, PermissionStatus::Denied)
            .with_permission(PermissionKind::Audio, PermissionStatus::Unknown),
    );
    assert_eq!(permissions.check(PermissionKind::Camera), PermissionStatus::Denied);
    assert_eq!(permissions.check(PermissionKind::Audio), PermissionStatus::Unknown);
}

#[tokio::test]
async fn test_native_request_resolves_with_answer() {
    let boundary = VirtualBoundary::new()
        .with_permission(PermissionKind::Camera, PermissionStatus::Unknown)
        .with_permission_answer(PermissionKind::Camera, PermissionStatus::Authorized);
    let permissions = native(boundary);

    assert_eq!(
        permissions.request(PermissionKind::Camera).await,
        PermissionStatus::Authorized
    );
    // The answer sticks
    assert_eq!(permissions.check(PermissionKind::Camera), PermissionStatus::Authorized);
}

#[tokio::test]
async fn test_native_request_answered_off_thread() {
    let boundary = VirtualBoundary::new()
        .with_delivery(DeliveryMode::Threaded {
            interval: Duration::from_millis(1),
        })
        .with_permission(PermissionKind::Audio, PermissionStatus::Unknown)
        .with_permission_answer(PermissionKind::Audio, PermissionStatus::Denied);
    let permissions = native(boundary);

    let status = tokio::time::timeout(
        Duration::from_secs(5),
        permissions.request(PermissionKind::Audio),
    )
    .await
    .unwrap();
    assert_eq!(status, PermissionStatus::Denied);
}

#[tokio::test]
async fn test_concurrent_requests_resolve_independently() {
    let boundary = VirtualBoundary::new()
        .with_permission_answer(PermissionKind::Audio, PermissionStatus::Authorized)
        .with_permission_answer(PermissionKind::Camera, PermissionStatus::Denied);
    let permissions = native(boundary);

    let (audio, camera) = tokio::join!(
        permissions.request(PermissionKind::Audio),
        permissions.request(PermissionKind::Camera)
    );
    assert_eq!(audio, PermissionStatus::Authorized);
    assert_eq!(camera, PermissionStatus::Denied);
}

#[test]
fn test_context_permissions_can_be_replaced() {
    let boundary = VirtualBoundary::new()
        .with_permission(PermissionKind::Camera, PermissionStatus::Denied);
    let context = MediaContext::new(Config::default(), Arc::new(boundary.clone()))
        .unwrap()
        .with_permissions(native(boundary));

    assert_eq!(
        context.permissions().check(PermissionKind::Camera),
        PermissionStatus::Denied
    );
}
