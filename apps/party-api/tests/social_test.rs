mod common;

use common::{connect_social, profile, recv_event, recv_named, send, send_plain, spawn_app};
use serde_json::json;

/// Friends A and B are both online; A reconnects from a second device and B
/// receives zero additional `friend:online` events.
#[tokio::test]
async fn second_device_is_silent_to_friends() {
    let app = spawn_app().await;
    app.store.add_user(profile("a", "ana"));
    app.store.add_user(profile("b", "ben"));
    app.store.add_friendship("a", "b");

    let mut b = connect_social(app.addr).await;
    send(&mut b, "user:online", json!({ "user_id": "b" })).await;

    let mut a1 = connect_social(app.addr).await;
    send(&mut a1, "user:online", json!({ "user_id": "a" })).await;

    // B sees A come online exactly once.
    let online = recv_named(&mut b, "friend:online").await;
    assert_eq!(online["friend_id"], "a");
    assert_eq!(online["username"], "ana");

    // Second device for A.
    let mut a2 = connect_social(app.addr).await;
    send(&mut a2, "user:online", json!({ "user_id": "a" })).await;

    // Deterministic silence check: the next thing B hears is typing, not a
    // second friend:online.
    send(&mut a2, "typing:start", json!({ "to_user_id": "b" })).await;
    let (tag, d) = recv_event(&mut b).await;
    assert_eq!(tag, "friend:typing");
    assert_eq!(d["friend_id"], "a");
    assert_eq!(d["is_typing"], true);
}

/// Offline is emitted only when the last connection drops, and it carries an
/// implicit activity stop first.
#[tokio::test]
async fn offline_after_last_disconnect_stops_activity() {
    let app = spawn_app().await;
    app.store.add_user(profile("a", "ana"));
    app.store.add_user(profile("b", "ben"));
    app.store.add_friendship("a", "b");

    let mut b = connect_social(app.addr).await;
    send(&mut b, "user:online", json!({ "user_id": "b" })).await;

    let mut a1 = connect_social(app.addr).await;
    send(&mut a1, "user:online", json!({ "user_id": "a" })).await;
    recv_named(&mut b, "friend:online").await;

    let mut a2 = connect_social(app.addr).await;
    send(&mut a2, "user:online", json!({ "user_id": "a" })).await;

    // A starts watching something.
    send(
        &mut a1,
        "activity:start",
        json!({
            "room_code": "ABCDEF",
            "content_type": "show",
            "content_id": "s1",
            "content_title": "Some Show"
        }),
    )
    .await;
    let activity = recv_named(&mut b, "friend:activity").await;
    assert_eq!(activity["friend_id"], "a");
    assert_eq!(activity["activity"]["content_title"], "Some Show");

    // First device drops: nothing for B (checked via typing sentinel).
    drop(a1);
    send(&mut a2, "typing:start", json!({ "to_user_id": "b" })).await;
    let (tag, _) = recv_event(&mut b).await;
    assert_eq!(tag, "friend:typing");

    // Last device drops: B gets the activity clear and then the offline.
    drop(a2);
    let stop = recv_named(&mut b, "friend:activity").await;
    assert!(stop["activity"].is_null());
    let offline = recv_named(&mut b, "friend:offline").await;
    assert_eq!(offline["friend_id"], "a");
}

/// Pull-based refresh: get-online lists online friends, get-activities
/// returns their current records with profile enrichment.
#[tokio::test]
async fn pull_queries_return_online_friends_and_activities() {
    let app = spawn_app().await;
    app.store.add_user(profile("a", "ana"));
    app.store.add_user(profile("b", "ben"));
    app.store.add_user(profile("c", "cam"));
    app.store.add_friendship("a", "b");
    app.store.add_friendship("a", "c");

    let mut b = connect_social(app.addr).await;
    send(&mut b, "user:online", json!({ "user_id": "b" })).await;

    let mut a = connect_social(app.addr).await;
    send(&mut a, "user:online", json!({ "user_id": "a" })).await;

    send(
        &mut b,
        "activity:start",
        json!({
            "room_code": "QRSTUV",
            "content_type": "anime",
            "content_id": "an1",
            "content_title": "Some Anime",
            "episode_title": "Episode 3"
        }),
    )
    .await;
    recv_named(&mut a, "friend:activity").await;

    // c never connected: only b shows up.
    send_plain(&mut a, "friends:get-online").await;
    let list = recv_named(&mut a, "friends:online-list").await;
    assert_eq!(list["online_friends"], json!(["b"]));

    send_plain(&mut a, "friends:get-activities").await;
    let activities = recv_named(&mut a, "friends:activities").await;
    let entries = activities["activities"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["friend_id"], "b");
    assert_eq!(entries[0]["username"], "ben");
    assert_eq!(entries[0]["activity"]["episode_title"], "Episode 3");
}

/// DMs are relayed in real time, echoed to the sender, and recorded as a
/// notification through the store.
#[tokio::test]
async fn dm_relay_echo_and_notification() {
    let app = spawn_app().await;
    app.store.add_user(profile("a", "ana"));
    app.store.add_user(profile("b", "ben"));
    app.store.add_friendship("a", "b");

    let mut a = connect_social(app.addr).await;
    send(&mut a, "user:online", json!({ "user_id": "a" })).await;
    let mut b = connect_social(app.addr).await;
    send(&mut b, "user:online", json!({ "user_id": "b" })).await;
    recv_named(&mut a, "friend:online").await;

    send(
        &mut a,
        "dm:send",
        json!({ "to_user_id": "b", "message": "movie night?" }),
    )
    .await;

    let received = recv_named(&mut b, "dm:received").await;
    assert_eq!(received["from_user_id"], "a");
    assert_eq!(received["message"], "movie night?");

    let sent = recv_named(&mut a, "dm:sent").await;
    assert_eq!(sent["to_user_id"], "b");

    let notification = recv_named(&mut b, "notification:new").await;
    assert_eq!(notification["kind"], "dm");
    assert_eq!(notification["from_user"]["username"], "ana");

    assert!(app
        .store
        .notifications()
        .contains(&("b".to_string(), "dm".to_string())));
}

/// Commands that need an identity are rejected until `user:online`.
#[tokio::test]
async fn identity_required_before_social_commands() {
    let app = spawn_app().await;

    let mut ws = connect_social(app.addr).await;
    send_plain(&mut ws, "friends:get-online").await;
    let err = recv_named(&mut ws, "error").await;
    assert_eq!(err["code"], "STATE_ERROR");
}

/// Friend-accepted notifications reach the requester, with an immediate
/// online marker for the new edge.
#[tokio::test]
async fn friend_accepted_notifies_and_marks_online() {
    let app = spawn_app().await;
    app.store.add_user(profile("a", "ana"));
    app.store.add_user(profile("b", "ben"));

    let mut a = connect_social(app.addr).await;
    send(&mut a, "user:online", json!({ "user_id": "a" })).await;
    let mut b = connect_social(app.addr).await;
    send(&mut b, "user:online", json!({ "user_id": "b" })).await;

    // b accepts a's friend request.
    send(&mut b, "friend:accepted", json!({ "to_user_id": "a" })).await;

    let notification = recv_named(&mut a, "notification:new").await;
    assert_eq!(notification["kind"], "friend_accepted");
    assert_eq!(notification["message"], "ben accepted your friend request");

    let online = recv_named(&mut a, "friend:online").await;
    assert_eq!(online["friend_id"], "b");
}
