//! Interactive Booking Console Example
//!
//! Demonstrates an interactive MessageClient that can:
//! 1. Connect to the salon server over TCP (or TLS with a CA bundle)
//! 2. Browse chairs and slot availability
//! 3. Book, approve, cancel appointments and chat on their threads
//!
//! Run: cargo run --example booking_console

use std::io::{self, Write};

use chairbook_client::{
    BusMessage, ChatThreadSynchronizer, ClientConfig, MessageClient, SlotSelection, ToggleOutcome,
};
use shared::appointment::{
    AppointmentCommand, AppointmentCommandPayload, DecisionParty, PartyDecision, RequesterRole,
};
use shared::message::ResponsePayload;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("\n💈 Chairbook Booking Console");
    println!("============================\n");

    let server_addr = get_input_with_default("Server Address", "127.0.0.1:8081");
    let user_id = get_input_with_default("Your user id", "cust-1");
    let user_name = get_input_with_default("Your display name", "Walk-in Customer");

    // Empty CA path means plain TCP
    let ca_path = get_input_with_default("CA bundle path (empty for plain TCP)", "");

    let mut config = ClientConfig::new(&server_addr)
        .with_client_name("booking-console")
        .with_client_id(&user_id);
    if !ca_path.is_empty() {
        let tls_name = get_input_with_default("TLS server name", "salon-server");
        config = config.with_tls(tls_name, ca_path);
    }

    println!("\n📡 Connecting to {}...", server_addr);
    let client = MessageClient::connect(config).await?;
    println!("✅ Connected, protocol handshake complete.\n");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    // Print pushes (sync signals, chat messages, typing) as they arrive
    let mut pushes = client.subscribe();
    tokio::spawn(async move {
        loop {
            match pushes.recv().await {
                Ok(msg) => print_push(&msg),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    eprintln!("\n⚠️  Missed {} pushes", n);
                }
                Err(_) => break,
            }
        }
    });

    interactive_loop(client, user_id, user_name).await
}

async fn interactive_loop(
    client: MessageClient,
    user_id: String,
    user_name: String,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        print_menu();
        io::stdout().flush()?;

        let choice = get_input("Enter choice (0-8): ");

        match choice.as_str() {
            "0" => {
                println!("\n👋 Goodbye!");
                client.close().await?;
                break;
            }
            "1" => {
                let response = client.send_command("catalog.chairs", None).await?;
                print_response("Chairs", &response);
            }
            "2" => {
                let chair_id = get_input("Chair ID (e.g., chair-1): ");
                let date = get_input("Date (YYYY-MM-DD): ");
                let response = client
                    .send_command(
                        "availability.day",
                        Some(serde_json::json!({ "chair_id": chair_id, "date": date })),
                    )
                    .await?;
                print_response("Availability", &response);
            }
            "3" => {
                let chair_id = get_input("Chair ID: ");
                let date = get_input("Date (YYYY-MM-DD): ");

                // Toggle slots the way a grid UI would; the selection
                // refuses any toggle that would break the block.
                let mut selection = SlotSelection::new();
                loop {
                    let slot = get_input("Toggle slot (HH:mm, empty to finish): ");
                    if slot.is_empty() {
                        break;
                    }
                    match selection.try_toggle(&slot) {
                        ToggleOutcome::Added | ToggleOutcome::Removed => {
                            println!("  Selected: {}", selection.selected_times().join(", "));
                        }
                        ToggleOutcome::NotContiguous => {
                            println!("  ❌ That would split the block, ignored");
                        }
                        ToggleOutcome::Invalid => println!("  ❌ Not an HH:mm time"),
                    }
                }
                let Some(start_time) = selection.start_time() else {
                    println!("❌ No slots selected");
                    continue;
                };
                if let Some((from, to)) = selection.booking_bounds() {
                    println!("Booking {} {} - {}", date, from, to);
                }

                let offerings = get_input("Offering ids (comma separated, empty for none): ");
                let offering_ids: Vec<String> = offerings
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();

                let command = AppointmentCommand::new(
                    &user_id,
                    &user_name,
                    AppointmentCommandPayload::CreateAppointment {
                        chair_id,
                        customer_id: user_id.clone(),
                        customer_name: user_name.clone(),
                        requester_role: RequesterRole::Customer,
                        date,
                        start_time,
                        slot_count: selection.slot_count(),
                        offering_ids,
                    },
                );
                let response = client
                    .send_command("create_appointment", Some(serde_json::to_value(&command)?))
                    .await?;
                print_response("Booking", &response);
            }
            "4" => {
                let appointment_id = get_input("Appointment ID: ");
                let party = match get_input("Deciding party (store/provider): ").as_str() {
                    "provider" => DecisionParty::Provider,
                    _ => DecisionParty::Store,
                };
                let decision = match get_input("Decision (approve/reject): ").as_str() {
                    "reject" => PartyDecision::Rejected,
                    _ => PartyDecision::Approved,
                };

                let command = AppointmentCommand::new(
                    &user_id,
                    &user_name,
                    AppointmentCommandPayload::SubmitDecision {
                        appointment_id,
                        party,
                        decision,
                    },
                );
                let response = client
                    .send_command("submit_decision", Some(serde_json::to_value(&command)?))
                    .await?;
                print_response("Decision", &response);
            }
            "5" => {
                let appointment_id = get_input("Appointment ID: ");
                let reason = get_input("Reason (optional): ");

                let command = AppointmentCommand::new(
                    &user_id,
                    &user_name,
                    AppointmentCommandPayload::CancelAppointment {
                        appointment_id,
                        cancelling_user_id: user_id.clone(),
                        reason: (!reason.is_empty()).then_some(reason),
                    },
                );
                let response = client
                    .send_command("cancel_appointment", Some(serde_json::to_value(&command)?))
                    .await?;
                print_response("Cancellation", &response);
            }
            "6" => {
                let appointment_id = get_input("Appointment ID: ");
                let response = client
                    .send_command(
                        "appointments.get",
                        Some(serde_json::json!({ "appointment_id": appointment_id })),
                    )
                    .await?;
                print_response("Appointment", &response);
            }
            "7" => {
                let response = client
                    .send_command(
                        "chat.threads",
                        Some(serde_json::json!({ "user_id": user_id })),
                    )
                    .await?;
                print_response("Threads", &response);
            }
            "8" => {
                let appointment_id = get_input("Appointment ID: ");
                match ChatThreadSynchronizer::open_for_appointment(
                    client.clone(),
                    &user_id,
                    &appointment_id,
                )
                .await
                {
                    Ok(mut chat) => {
                        println!("\n💬 {} (newest first)", chat.thread().title);
                        for message in chat.messages().iter().take(10) {
                            println!("  [{}] {}", message.sender_user_id, message.text);
                        }
                        let text = get_input("Message (empty to skip): ");
                        if !text.is_empty() {
                            match chat.send_message(&text).await {
                                Ok(sent) => println!("✅ Sent as {}", sent.message_id),
                                Err(e) => println!("❌ Send failed: {}", e),
                            }
                        }
                    }
                    Err(e) => println!("❌ Could not open thread: {}", e),
                }
            }
            _ => println!("❌ Invalid choice"),
        }
    }

    Ok(())
}

fn print_response(label: &str, response: &ResponsePayload) {
    if response.success {
        println!("\n✅ {}: {}", label, response.message);
        if let Some(data) = &response.data {
            println!(
                "{}",
                serde_json::to_string_pretty(data).unwrap_or_default()
            );
        }
    } else {
        println!(
            "\n❌ {} failed [{}]: {}",
            label,
            response.error_code.as_deref().unwrap_or("UNKNOWN"),
            response.message
        );
    }
}

fn print_push(msg: &BusMessage) {
    println!("\n📨 Push: [{}]", msg.event_type);

    match msg.parse_payload::<serde_json::Value>() {
        Ok(payload) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).unwrap_or_default()
            );
        }
        Err(_) => {
            println!("(Raw payload: {} bytes)", msg.payload.len());
        }
    }
    print!("\n> "); // Restore prompt
    let _ = io::stdout().flush();
}

fn print_menu() {
    println!("\nAvailable Actions:");
    println!("1. List Chairs");
    println!("2. Day Availability");
    println!("3. Book a Block");
    println!("4. Approve / Reject");
    println!("5. Cancel Appointment");
    println!("6. Show Appointment");
    println!("7. My Chat Threads");
    println!("8. Open Appointment Chat");
    println!("0. Exit");
}

fn get_input(prompt: &str) -> String {
    print!("{}", prompt);
    io::stdout().flush().unwrap();
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();
    input.trim().to_string()
}

fn get_input_with_default(prompt: &str, default: &str) -> String {
    print!("{} [{}]: ", prompt, default);
    io::stdout().flush().unwrap();
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();
    let input = input.trim();
    if input.is_empty() {
        default.to_string()
    } else {
        input.to_string()
    }
}
