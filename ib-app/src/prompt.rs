//! System prompt and user-facing notices, per locale.

use crate::config::Locale;
use ib_tools::IssueToolText;

const SYSTEM_PROMPT_JA: &str = "あなたはアイデアをGitHub Issueに変換するアシスタントです。
Slackを通じてユーザーと会話しています。

## ワークフロー
1. ユーザーのアイデアをヒアリング・深掘りする
2. 十分に整理できたら、以下のフォーマットでIssue内容を提案する
3. ユーザーが「起票して」「Issueにして」などと言ったら、create_github_issue ツールを使ってIssueを作成する

## Issue フォーマット
- タイトル: 簡潔で明確（日本語OK）
- 本文:
  ## 概要
  [何をしたいか / 何が問題か]

  ## 詳細
  [背景や具体的な内容]

  ## 受け入れ条件
  - [ ] 完了条件1
  - [ ] 完了条件2

## 注意事項
- アイデアが曖昧な段階では、質問で深掘りする
- いきなりIssueにせず、まず会話でアイデアを膨らませる
- ユーザーが起票を指示するまでは提案に留める
- ラベルやアサインはユーザーが指定した場合のみ付与する
- Slackなのでメッセージは簡潔に。長文を避ける";

const SYSTEM_PROMPT_EN: &str = "You are an assistant that turns ideas into GitHub issues.
You are talking with the user through Slack.

## Workflow
1. Interview the user about their idea and dig deeper.
2. Once it is clear enough, propose the issue content in the format below.
3. When the user says something like \"file it\" or \"make it an issue\", create the issue with the create_github_issue tool.

## Issue format
- Title: short and clear
- Body:
  ## Overview
  [What should be done / what is the problem]

  ## Details
  [Background and specifics]

  ## Acceptance criteria
  - [ ] Condition 1
  - [ ] Condition 2

## Notes
- While the idea is still vague, ask questions to sharpen it.
- Do not jump straight to an issue; develop the idea in conversation first.
- Only propose until the user tells you to file it.
- Add labels or assignees only when the user asks for them.
- This is Slack, so keep messages concise and avoid long text.";

pub fn system_prompt(locale: Locale) -> &'static str {
    match locale {
        Locale::Ja => SYSTEM_PROMPT_JA,
        Locale::En => SYSTEM_PROMPT_EN,
    }
}

pub fn issue_tool_text(locale: Locale) -> &'static IssueToolText {
    match locale {
        Locale::Ja => &IssueToolText::JAPANESE,
        Locale::En => &IssueToolText::ENGLISH,
    }
}

/// Fixed strings the bot sends or records without going through the model.
#[derive(Debug, Clone)]
pub struct Notices {
    locale: Locale,
}

impl Notices {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    /// Reply used when the model returns no text at all.
    pub fn empty_response(&self) -> &'static str {
        match self.locale {
            Locale::Ja => "（応答を生成できませんでした）",
            Locale::En => "(Could not generate a response)",
        }
    }

    /// Tool-result text recorded after an issue is filed.
    pub fn issue_created(&self, number: u64, url: &str) -> String {
        match self.locale {
            Locale::Ja => format!("Issue #{number} を作成しました: {url}"),
            Locale::En => format!("Issue #{number} created: {url}"),
        }
    }

    pub fn issue_failed(&self, error: &str) -> String {
        match self.locale {
            Locale::Ja => format!("Issue の作成に失敗しました: {error}"),
            Locale::En => format!("Failed to create the issue: {error}"),
        }
    }

    pub fn apology(&self) -> &'static str {
        match self.locale {
            Locale::Ja => "エラーが発生しました。しばらくしてからもう一度お試しください。",
            Locale::En => "An error occurred. Please try again in a little while.",
        }
    }

    pub fn conversation_reset(&self) -> &'static str {
        match self.locale {
            Locale::Ja => "会話をリセットしました。新しいアイデアをどうぞ。",
            Locale::En => "Conversation reset. Tell me about your next idea.",
        }
    }

    pub fn help(&self) -> &'static str {
        match self.locale {
            Locale::Ja => {
                "アイデアを送ってください。一緒に整理して、「起票して」と言われたら GitHub Issue を作成します。\n\
                 コマンド: /new または /reset で会話をリセット、/help でこのメッセージを表示"
            }
            Locale::En => {
                "Send me an idea. We'll shape it together, and when you say \"file it\" I'll open a GitHub issue.\n\
                 Commands: /new or /reset to start over, /help to show this message"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_mentions_tool_and_issue_sections() {
        let ja = system_prompt(Locale::Ja);
        assert!(ja.contains("create_github_issue"));
        assert!(ja.contains("## 概要"));
        assert!(ja.contains("## 受け入れ条件"));

        let en = system_prompt(Locale::En);
        assert!(en.contains("create_github_issue"));
        assert!(en.contains("## Acceptance criteria"));
    }

    #[test]
    fn issue_tool_text_follows_locale() {
        assert_eq!(issue_tool_text(Locale::Ja).title, "Issue のタイトル");
        assert_eq!(issue_tool_text(Locale::En).title, "Issue title");
    }

    #[test]
    fn issue_notices_embed_number_url_and_error() {
        let ja = Notices::new(Locale::Ja);
        assert_eq!(
            ja.issue_created(7, "https://github.com/o/r/issues/7"),
            "Issue #7 を作成しました: https://github.com/o/r/issues/7"
        );
        assert_eq!(
            ja.issue_failed("rate limit"),
            "Issue の作成に失敗しました: rate limit"
        );

        let en = Notices::new(Locale::En);
        assert_eq!(
            en.issue_created(7, "https://github.com/o/r/issues/7"),
            "Issue #7 created: https://github.com/o/r/issues/7"
        );
        assert!(en.issue_failed("rate limit").contains("rate limit"));
    }
}
