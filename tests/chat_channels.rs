//! Chat service behaviour across the world channel and alliance channels.

use std::sync::atomic::{AtomicBool, Ordering};

use realmkeep::chat::{ChatService, ChatUser, JoinOutcome};
use realmkeep::types::ChannelKind;

#[test]
fn world_message_reaches_every_member_history() {
    let chat = ChatService::new(100);
    chat.login(ChatUser::new(7, "Seven"));
    chat.login(ChatUser::new(8, "Eight"));
    chat.login(ChatUser::new(9, "Nine"));

    let delivery = chat.send(7, ChannelKind::World, "hello").expect("delivered");
    assert_eq!(delivery.recipients, vec![7, 8, 9]);

    for reader in [8, 9] {
        let history = chat.history(reader, ChannelKind::World);
        assert!(history
            .iter()
            .any(|m| m.sender_id == 7 && m.text == "hello" && m.channel == ChannelKind::World));
    }
}

#[test]
fn alliance_chat_requires_world_login() {
    let chat = ChatService::new(10);
    assert!(chat.join_alliance(5, 1).is_err());
    chat.login(ChatUser::new(5, "Five"));
    assert_eq!(chat.join_alliance(5, 1).unwrap(), JoinOutcome::Joined);
}

#[test]
fn alliance_history_is_private_to_the_alliance() {
    let chat = ChatService::new(10);
    for (id, alliance) in [(1, 100), (2, 100), (3, 200)] {
        chat.login(ChatUser::new(id, &format!("p{}", id)));
        chat.join_alliance(id, alliance).unwrap();
    }
    chat.send(1, ChannelKind::Alliance, "north only").expect("sent");

    assert_eq!(chat.history(2, ChannelKind::Alliance).len(), 1);
    assert!(chat.history(3, ChannelKind::Alliance).is_empty());
    // Not in the channel: silently dropped, nothing stored.
    assert!(chat.send(3, ChannelKind::World, "x").is_some());
    chat.exit(3, ChannelKind::Alliance);
    assert!(chat.send(3, ChannelKind::Alliance, "lost").is_none());
}

#[test]
fn log_out_leaves_both_channels() {
    let chat = ChatService::new(10);
    chat.login(ChatUser::new(4, "Four"));
    chat.join_alliance(4, 9).unwrap();
    chat.log_out(4);
    assert!(!chat.world().is_member(4));
    assert_eq!(chat.directory().alliance_of(4), None);
    assert_eq!(chat.directory().group_count(), 0);
}

#[test]
fn alliance_switching_never_breaks_the_directory_invariant() {
    let chat = ChatService::new(10);
    for id in 1..=6 {
        chat.login(ChatUser::new(id, &format!("p{}", id)));
    }
    let done = AtomicBool::new(false);
    let violations = std::sync::atomic::AtomicUsize::new(0);

    std::thread::scope(|s| {
        for reader in 0..2 {
            let chat = &chat;
            let done = &done;
            let violations = &violations;
            s.spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    if !chat.directory().is_consistent() {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    let _ = chat.history(reader + 1, ChannelKind::Alliance);
                }
            });
        }

        let writers: Vec<_> = (1..=6)
            .map(|player| {
                let chat = &chat;
                s.spawn(move || {
                    for round in 0..200i64 {
                        let alliance = (player + round) % 4;
                        chat.join_alliance(player, alliance).unwrap();
                        if round % 7 == 0 {
                            chat.send(player, ChannelKind::Alliance, "tick");
                        }
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
    });

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert!(chat.directory().is_consistent());
    for player in 1..=6i64 {
        let expected = (player + 199) % 4;
        let mapped = chat.directory().alliance_of(player);
        if expected == 0 {
            assert_eq!(mapped, None);
        } else {
            assert_eq!(mapped, Some(expected));
            assert!(chat.directory().members(expected).contains(&player));
        }
    }
}

#[test]
fn history_limit_applies_per_channel() {
    let chat = ChatService::new(3);
    chat.login(ChatUser::new(1, "One"));
    for i in 0..10 {
        chat.send(1, ChannelKind::World, &format!("line {}", i));
    }
    let history = chat.history(1, ChannelKind::World);
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].text, "line 7");
    assert_eq!(history[2].text, "line 9");
}
