//! Demonstrates strong and weak handles, the teardown hook and pool-backed storage.
//!
//! Run with `cargo run --example intrusive_rc_basic` to also see the teardown events logged at
//! trace level.

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use bucket_pool::{ExclusivePool, MemoryPool};
use intrusive_rc::{RefCounted, Strong, Weak};

struct Session {
    user: String,
    peer: RefCell<Weak<Session>>,
}

impl RefCounted for Session {
    fn on_last_strong_released(&mut self) {
        println!("  tearing down session of {}", self.user);
        self.peer.get_mut().reset();
    }
}

impl Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session of {}", self.user)
    }
}

fn session(user: &str, pool: &Rc<dyn MemoryPool>) -> Strong<Session> {
    Strong::new_in(
        Session {
            user: user.to_string(),
            peer: RefCell::new(Weak::empty()),
        },
        Rc::clone(pool),
    )
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    println!("=== intrusive_rc basic example ===");
    println!();

    let pool: Rc<dyn MemoryPool> = Rc::new(ExclusivePool::new());

    let alice = session("alice", &pool);
    let bob = session("bob", &pool);

    // Peers observe each other weakly, so neither keeps the other alive.
    *alice.peer.borrow_mut() = bob.downgrade();
    *bob.peer.borrow_mut() = alice.downgrade();

    println!(
        "alice: strong {}, weak {}",
        alice.strong_count(),
        alice.weak_count()
    );

    let printable: Strong<dyn Display> = alice.clone().cast_with(|s| s as &dyn Display);
    println!("as Display: {}", &*printable);
    drop(printable);

    let observer = alice.downgrade();

    println!();
    println!("Dropping alice:");
    drop(alice);

    println!(
        "observer expired: {}, strong {}, weak {}",
        observer.is_expired(),
        observer.strong_count(),
        observer.weak_count()
    );

    match bob.peer.borrow().lock().get() {
        Some(peer) => println!("bob's peer is still {peer}"),
        None => println!("bob's peer is gone"),
    }

    println!();
    println!("Dropping bob:");
    drop(bob);
    drop(observer);

    println!();
    println!("{}", pool.statistics());
}
