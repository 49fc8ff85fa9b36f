//! In-memory data store for the dev server.
//!
//! Holds users, chat messages, gig listings, and swap requests behind
//! [`parking_lot`] locks. No lock is held across an await point; handlers
//! take what they need and release immediately.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;

use skillnet_proto::auth::UserProfile;
use skillnet_proto::conversation::ConversationSummary;
use skillnet_proto::gig::{Deliverable, Gig, GigDraft, SwapRequest, SwapRequestCheck, SwapStatus};
use skillnet_proto::message::ChatMessage;
use skillnet_proto::room::RoomId;

/// Store operation failures, mapped to HTTP statuses by the server layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("not found")]
    NotFound,
    /// The acting user does not own the record.
    #[error("not the owner")]
    NotOwner,
    /// The acting user is not a participant in the swap.
    #[error("not a participant")]
    NotParticipant,
    /// A conflicting record already exists.
    #[error("already exists")]
    Duplicate,
    /// A user cannot request a swap against their own listing.
    #[error("cannot request a swap on your own gig")]
    OwnGig,
    /// The swap is not in the state the operation requires.
    #[error("swap is not in the required state")]
    WrongState,
    /// The username is empty or contains a reserved character.
    #[error("invalid username")]
    InvalidUsername,
}

/// A registered user, password included (it's a dev server).
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// Server-assigned id.
    pub id: u64,
    /// Unique username.
    pub username: String,
    /// Unique login email.
    pub email: String,
    /// Plaintext password.
    pub password: String,
    /// Optional first name.
    pub first_name: String,
    /// Optional last name.
    pub last_name: String,
    /// Optional avatar URL.
    pub profile_picture: Option<String>,
}

impl UserRecord {
    /// The wire-facing profile for this user.
    #[must_use]
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            profile_picture: self.profile_picture.clone(),
        }
    }
}

/// A stored chat message plus its routing metadata.
#[derive(Debug, Clone)]
struct StoredChat {
    room: RoomId,
    receiver: String,
    message: ChatMessage,
}

/// A swap request plus the server-side state the wire shape omits.
#[derive(Debug, Clone)]
struct SwapRecord {
    request: SwapRequest,
    gig_owner: String,
    deliverables: Vec<Deliverable>,
}

/// The whole dev-server dataset.
#[derive(Default)]
pub struct DevStore {
    users: RwLock<Vec<UserRecord>>,
    messages: RwLock<Vec<StoredChat>>,
    gigs: RwLock<Vec<Gig>>,
    swaps: RwLock<Vec<SwapRecord>>,
    next_user_id: AtomicU64,
    next_message_id: AtomicU64,
    next_gig_id: AtomicU64,
    next_swap_id: AtomicU64,
}

impl DevStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- users --

    /// Register a user. Fails on a username or email collision.
    ///
    /// # Errors
    ///
    /// [`StoreError::Duplicate`] when the username or email is taken.
    pub fn add_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, StoreError> {
        // `_` is the room-id separator; a username containing it would make
        // room membership checks ambiguous.
        if username.is_empty() || username.contains('_') {
            return Err(StoreError::InvalidUsername);
        }
        let mut users = self.users.write();
        if users
            .iter()
            .any(|u| u.username == username || u.email == email)
        {
            return Err(StoreError::Duplicate);
        }
        let record = UserRecord {
            id: self.next_user_id.fetch_add(1, Ordering::Relaxed) + 1,
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            profile_picture: None,
        };
        let profile = record.profile();
        users.push(record);
        Ok(profile)
    }

    /// Look up a user by login credentials.
    #[must_use]
    pub fn authenticate(&self, email: &str, password: &str) -> Option<UserRecord> {
        self.users
            .read()
            .iter()
            .find(|u| u.email == email && u.password == password)
            .cloned()
    }

    /// Look up a user by username.
    #[must_use]
    pub fn user_by_username(&self, username: &str) -> Option<UserRecord> {
        self.users
            .read()
            .iter()
            .find(|u| u.username == username)
            .cloned()
    }

    /// Apply a partial profile update. Recognized fields: `firstName`,
    /// `lastName`, `profilePicture`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown username.
    pub fn update_profile(
        &self,
        username: &str,
        fields: &serde_json::Value,
    ) -> Result<UserProfile, StoreError> {
        let mut users = self.users.write();
        let user = users
            .iter_mut()
            .find(|u| u.username == username)
            .ok_or(StoreError::NotFound)?;
        if let Some(v) = fields.get("firstName").and_then(|v| v.as_str()) {
            user.first_name = v.to_string();
        }
        if let Some(v) = fields.get("lastName").and_then(|v| v.as_str()) {
            user.last_name = v.to_string();
        }
        if let Some(v) = fields.get("profilePicture").and_then(|v| v.as_str()) {
            user.profile_picture = Some(v.to_string());
        }
        Ok(user.profile())
    }

    // -- chat --

    /// Store a message and return the record the server will echo.
    pub fn append_message(&self, sender: &str, receiver: &str, body: &str) -> ChatMessage {
        let message = ChatMessage {
            sender: sender.to_string(),
            message: body.to_string(),
            created_at: Utc::now(),
            id: Some(self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1),
        };
        self.messages.write().push(StoredChat {
            room: RoomId::for_pair(sender, receiver),
            receiver: receiver.to_string(),
            message: message.clone(),
        });
        message
    }

    /// All stored messages for a room, oldest first.
    #[must_use]
    pub fn history(&self, room: &RoomId) -> Vec<ChatMessage> {
        self.messages
            .read()
            .iter()
            .filter(|m| &m.room == room)
            .map(|m| m.message.clone())
            .collect()
    }

    /// The conversation directory for one user: each partner once, with
    /// the latest message, newest conversation first.
    #[must_use]
    pub fn conversations(&self, username: &str) -> Vec<ConversationSummary> {
        let messages = self.messages.read();
        let mut latest: Vec<(String, &StoredChat)> = Vec::new();
        for stored in messages.iter() {
            let partner = if stored.message.sender == username {
                stored.receiver.clone()
            } else if stored.receiver == username {
                stored.message.sender.clone()
            } else {
                continue;
            };
            match latest.iter_mut().find(|(p, _)| *p == partner) {
                Some(entry) if entry.1.message.created_at < stored.message.created_at => {
                    entry.1 = stored;
                }
                Some(_) => {}
                None => latest.push((partner, stored)),
            }
        }
        latest.sort_by(|a, b| b.1.message.created_at.cmp(&a.1.message.created_at));

        let users = self.users.read();
        latest
            .into_iter()
            .map(|(partner, stored)| {
                let profile = users.iter().find(|u| u.username == partner);
                ConversationSummary {
                    username: partner,
                    first_name: profile.map(|u| u.first_name.clone()).unwrap_or_default(),
                    last_name: profile.map(|u| u.last_name.clone()).unwrap_or_default(),
                    last_message: stored.message.message.clone(),
                    last_message_time: stored.message.created_at,
                    profile_picture: profile.and_then(|u| u.profile_picture.clone()),
                }
            })
            .collect()
    }

    // -- gigs --

    /// Create a listing for `owner`.
    pub fn create_gig(&self, owner: &str, draft: &GigDraft, image: Option<String>) -> Gig {
        let gig = Gig {
            id: self.next_gig_id.fetch_add(1, Ordering::Relaxed) + 1,
            owner: owner.to_string(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            offered_skills: draft.offering.clone(),
            desired_skills: draft.looking_for.clone(),
            tags: draft.tags.clone(),
            gig_image: image,
            impressions: 0,
            clicks: 0,
            swaps: 0,
            is_active: true,
            created_at: Utc::now(),
        };
        self.gigs.write().push(gig.clone());
        gig
    }

    /// One listing by id.
    #[must_use]
    pub fn gig(&self, gig_id: u64) -> Option<Gig> {
        self.gigs.read().iter().find(|g| g.id == gig_id).cloned()
    }

    /// Active listings, optionally filtered by a substring match on title,
    /// description, skills, or tags.
    #[must_use]
    pub fn list_gigs(&self, search: Option<&str>) -> Vec<Gig> {
        let needle = search.map(str::to_lowercase);
        self.gigs
            .read()
            .iter()
            .filter(|g| g.is_active)
            .filter(|g| {
                needle.as_ref().is_none_or(|n| {
                    g.title.to_lowercase().contains(n)
                        || g.description.to_lowercase().contains(n)
                        || g.offered_skills.to_lowercase().contains(n)
                        || g.desired_skills.to_lowercase().contains(n)
                        || g.tags.iter().any(|t| t.to_lowercase().contains(n))
                })
            })
            .cloned()
            .collect()
    }

    /// All listings belonging to one user, inactive ones included.
    #[must_use]
    pub fn gigs_of(&self, owner: &str) -> Vec<Gig> {
        self.gigs
            .read()
            .iter()
            .filter(|g| g.owner == owner)
            .cloned()
            .collect()
    }

    /// Replace the editable fields of a listing.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`], or [`StoreError::NotOwner`] when `actor`
    /// did not create the listing.
    pub fn update_gig(&self, gig_id: u64, actor: &str, draft: &GigDraft) -> Result<Gig, StoreError> {
        let mut gigs = self.gigs.write();
        let gig = gigs
            .iter_mut()
            .find(|g| g.id == gig_id)
            .ok_or(StoreError::NotFound)?;
        if gig.owner != actor {
            return Err(StoreError::NotOwner);
        }
        gig.title = draft.title.clone();
        gig.description = draft.description.clone();
        gig.offered_skills = draft.offering.clone();
        gig.desired_skills = draft.looking_for.clone();
        gig.tags = draft.tags.clone();
        Ok(gig.clone())
    }

    /// Delete a listing.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`], or [`StoreError::NotOwner`] when `actor`
    /// did not create the listing.
    pub fn delete_gig(&self, gig_id: u64, actor: &str) -> Result<(), StoreError> {
        let mut gigs = self.gigs.write();
        let index = gigs
            .iter()
            .position(|g| g.id == gig_id)
            .ok_or(StoreError::NotFound)?;
        if gigs[index].owner != actor {
            return Err(StoreError::NotOwner);
        }
        gigs.remove(index);
        Ok(())
    }

    /// Increment a listing's impression counter, returning the new value.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown listing.
    pub fn bump_impressions(&self, gig_id: u64) -> Result<u64, StoreError> {
        let mut gigs = self.gigs.write();
        let gig = gigs
            .iter_mut()
            .find(|g| g.id == gig_id)
            .ok_or(StoreError::NotFound)?;
        gig.impressions += 1;
        Ok(gig.impressions)
    }

    /// Increment a listing's click counter, returning the new value.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown listing.
    pub fn bump_clicks(&self, gig_id: u64) -> Result<u64, StoreError> {
        let mut gigs = self.gigs.write();
        let gig = gigs
            .iter_mut()
            .find(|g| g.id == gig_id)
            .ok_or(StoreError::NotFound)?;
        gig.clicks += 1;
        Ok(gig.clicks)
    }

    // -- swaps --

    /// Propose a swap against a listing.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown listing,
    /// [`StoreError::OwnGig`] for the owner's own listing,
    /// [`StoreError::Duplicate`] when a pending request already exists.
    pub fn create_swap(
        &self,
        gig_id: u64,
        requestor: &str,
        message: &str,
    ) -> Result<SwapRequest, StoreError> {
        let gig = self.gig(gig_id).ok_or(StoreError::NotFound)?;
        if gig.owner == requestor {
            return Err(StoreError::OwnGig);
        }
        let mut swaps = self.swaps.write();
        if swaps.iter().any(|s| {
            s.request.gig_id == gig_id
                && s.request.requestor == requestor
                && s.request.status == SwapStatus::Pending
        }) {
            return Err(StoreError::Duplicate);
        }
        let request = SwapRequest {
            id: self.next_swap_id.fetch_add(1, Ordering::Relaxed) + 1,
            gig_id,
            requestor: requestor.to_string(),
            status: SwapStatus::Pending,
            message: message.to_string(),
            created_at: Utc::now(),
        };
        swaps.push(SwapRecord {
            request: request.clone(),
            gig_owner: gig.owner,
            deliverables: Vec::new(),
        });
        Ok(request)
    }

    /// Whether `requestor` already has a live request against a listing.
    #[must_use]
    pub fn check_swap(&self, gig_id: u64, requestor: &str) -> SwapRequestCheck {
        let swaps = self.swaps.read();
        let existing = swaps.iter().find(|s| {
            s.request.gig_id == gig_id
                && s.request.requestor == requestor
                && matches!(s.request.status, SwapStatus::Pending | SwapStatus::Accepted)
        });
        SwapRequestCheck {
            has_requested: existing.is_some(),
            swap_id: existing.map(|s| s.request.id),
        }
    }

    /// Requests targeting listings owned by `owner`, newest first.
    #[must_use]
    pub fn swaps_for_owner(&self, owner: &str) -> Vec<SwapRequest> {
        let mut requests: Vec<SwapRequest> = self
            .swaps
            .read()
            .iter()
            .filter(|s| s.gig_owner == owner)
            .map(|s| s.request.clone())
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        requests
    }

    /// Accept or decline a pending request.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`], [`StoreError::NotOwner`] when `actor`
    /// does not own the target listing, [`StoreError::WrongState`] when
    /// the request is no longer pending.
    pub fn respond_swap(
        &self,
        swap_id: u64,
        actor: &str,
        accept: bool,
    ) -> Result<SwapRequest, StoreError> {
        let mut swaps = self.swaps.write();
        let swap = swaps
            .iter_mut()
            .find(|s| s.request.id == swap_id)
            .ok_or(StoreError::NotFound)?;
        if swap.gig_owner != actor {
            return Err(StoreError::NotOwner);
        }
        if swap.request.status != SwapStatus::Pending {
            return Err(StoreError::WrongState);
        }
        swap.request.status = if accept {
            SwapStatus::Accepted
        } else {
            SwapStatus::Declined
        };
        Ok(swap.request.clone())
    }

    /// Withdraw a pending request.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`], [`StoreError::NotOwner`] when `actor` is
    /// not the requestor, [`StoreError::WrongState`] when the request is
    /// no longer pending.
    pub fn withdraw_swap(&self, swap_id: u64, actor: &str) -> Result<SwapRequest, StoreError> {
        let mut swaps = self.swaps.write();
        let swap = swaps
            .iter_mut()
            .find(|s| s.request.id == swap_id)
            .ok_or(StoreError::NotFound)?;
        if swap.request.requestor != actor {
            return Err(StoreError::NotOwner);
        }
        if swap.request.status != SwapStatus::Pending {
            return Err(StoreError::WrongState);
        }
        swap.request.status = SwapStatus::Withdrawn;
        Ok(swap.request.clone())
    }

    /// Both sides' deliverables for a swap.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown swap,
    /// [`StoreError::NotParticipant`] when `actor` is neither side.
    pub fn deliverables(&self, swap_id: u64, actor: &str) -> Result<Vec<Deliverable>, StoreError> {
        let swaps = self.swaps.read();
        let swap = swaps
            .iter()
            .find(|s| s.request.id == swap_id)
            .ok_or(StoreError::NotFound)?;
        if swap.request.requestor != actor && swap.gig_owner != actor {
            return Err(StoreError::NotParticipant);
        }
        Ok(swap.deliverables.clone())
    }

    /// Record one side's deliverable for an accepted swap. When both sides
    /// have delivered, the swap completes and the listing's swap counter
    /// is incremented.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`], [`StoreError::NotParticipant`] when
    /// `actor` is neither side, [`StoreError::WrongState`] when the swap
    /// is not accepted.
    pub fn submit_deliverable(
        &self,
        swap_id: u64,
        actor: &str,
        comment: &str,
        file_name: Option<String>,
    ) -> Result<Deliverable, StoreError> {
        let mut swaps = self.swaps.write();
        let swap = swaps
            .iter_mut()
            .find(|s| s.request.id == swap_id)
            .ok_or(StoreError::NotFound)?;
        if swap.request.requestor != actor && swap.gig_owner != actor {
            return Err(StoreError::NotParticipant);
        }
        if swap.request.status != SwapStatus::Accepted {
            return Err(StoreError::WrongState);
        }

        let deliverable = Deliverable {
            user: actor.to_string(),
            file_name,
            comment: comment.to_string(),
            completed: true,
        };
        swap.deliverables.retain(|d| d.user != actor);
        swap.deliverables.push(deliverable.clone());

        let both_done = [&swap.request.requestor, &swap.gig_owner]
            .iter()
            .all(|side| swap.deliverables.iter().any(|d| &d.user == *side && d.completed));
        if both_done {
            swap.request.status = SwapStatus::Completed;
            let gig_id = swap.request.gig_id;
            drop(swaps);
            let mut gigs = self.gigs.write();
            if let Some(gig) = gigs.iter_mut().find(|g| g.id == gig_id) {
                gig.swaps += 1;
            }
        }
        Ok(deliverable)
    }
}
