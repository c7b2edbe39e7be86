pub mod appliance;
pub mod coach;
pub mod diary;
pub mod domain;
pub mod ports;
pub mod quests;
pub mod session;
pub mod shop;

#[cfg(test)]
pub(crate) mod mock;

pub use domain::{
    Appliance, ApplianceKind, AudioFormat, AuthSession, Diary, DiaryPatch, DiaryStatus, DiaryTurn,
    GoalType, MediaItem, MediaStatus, PhotoRef, Quest, QuestStatus, QuestView, RunState,
    ShopItem, SpeechAudio, User, UserCredentials, UserQuest, UserView,
};
pub use ports::{
    CoachModelService, DatabaseService, ObjectStorageService, PhotoAttachment, PortError,
    PortResult, SpeechToTextService, TextToSpeechService,
};
pub use session::{ChatSession, ChatSessionRecord, ChatTurn, SessionMode, TurnPart};
